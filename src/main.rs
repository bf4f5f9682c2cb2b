use gesture_audio::audio::{
    AudioOutput, AutoplayPolicy, NativeOutput, PlayOptions, PlaybackEngine, SimulatedOutput,
    SimulationController, SimulationOptions,
};
use gesture_audio::cli::{CliApp, Commands, ConfigAction, DeviceAction, ParseError, ShellCommand, StatusDisplay};
use gesture_audio::config::{ConfigManager, ReadinessPolicy};
use gesture_audio::error::{ErrorSeverity, PlaybackError, PlayerError};
use gesture_audio::error_recovery::{RecoveryAction, RetryAdvisor};
use gesture_audio::logging::{AudioLogger, LOG_LEVEL_ENV};
use log::{error, info, warn};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Poll period for progress output and the simulated clock
const TICK: Duration = Duration::from_millis(250);

/// How a play session finished, as reported through its callbacks
#[derive(Debug)]
enum SessionOutcome {
    Ended { locator: String },
    Failed(PlaybackError),
}

/// Coordinates the engine, the saved configuration and the terminal
struct AppController<O: AudioOutput> {
    engine: PlaybackEngine<O>,
    config_manager: ConfigManager,
    simulation: Option<SimulationController>,
    recovery: RetryAdvisor,
    shutdown: Arc<AtomicBool>,
}

impl<O: AudioOutput> AppController<O> {
    fn new(
        engine: PlaybackEngine<O>,
        config_manager: ConfigManager,
        simulation: Option<SimulationController>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            engine,
            config_manager,
            simulation,
            recovery: RetryAdvisor::new(2),
            shutdown,
        }
    }

    async fn execute(&mut self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Play { locator, volume, rate, retries } => {
                self.recovery = RetryAdvisor::new(retries);
                let locator = CliApp::expand_locator(&locator);
                // Invoking the command is the user's gesture
                self.gesture_unlock().await;
                let result = self.play_until_done(&locator, volume, rate).await;
                self.engine.destroy();
                result
            }
            Commands::Unlock => {
                if self.gesture_unlock().await {
                    println!("OK: Output unlocked");
                } else {
                    println!("Unlock refused: {}", self.recovery.advise_unlock_failure().message());
                }
                self.engine.destroy();
                Ok(())
            }
            Commands::Shell => self.run_shell().await,
            Commands::Device { .. } | Commands::Config { .. } => Ok(()),
        }
    }

    /// Run `unlock()` as if from a user input handler
    async fn gesture_unlock(&self) -> bool {
        if let Some(simulation) = &self.simulation {
            simulation.begin_gesture();
        }
        let unlocked = self.engine.unlock().await;
        if let Some(simulation) = &self.simulation {
            simulation.end_gesture();
        }
        unlocked
    }

    fn play_options(
        volume: Option<u8>,
        rate: Option<f32>,
        locator: &str,
        tx: mpsc::UnboundedSender<SessionOutcome>,
    ) -> PlayOptions {
        let ended_tx = tx.clone();
        let ended_locator = locator.to_string();
        let mut options = PlayOptions::new()
            .on_ended(move || {
                let _ = ended_tx.send(SessionOutcome::Ended { locator: ended_locator.clone() });
            })
            .on_error(move |e| {
                let _ = tx.send(SessionOutcome::Failed(e.clone()));
            });

        if let Some(level) = volume {
            options = options.volume(level.min(100) as f32 / 100.0);
        }
        if let Some(rate) = rate {
            options = options.playback_rate(rate);
        }
        options
    }

    /// Play `locator` to the end, retrying the way the recovery advisor suggests
    async fn play_until_done(&mut self, locator: &str, volume: Option<u8>, rate: Option<f32>) -> Result<(), PlayerError> {
        loop {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let options = Self::play_options(volume, rate, locator, tx);

            println!("Playing: {}", StatusDisplay::short_name(locator));
            let started = self.engine.play(locator, options).await;

            let outcome = if started {
                self.watch_progress(&mut rx).await
            } else {
                rx.try_recv().ok()
            };

            match outcome {
                Some(SessionOutcome::Ended { locator }) => {
                    self.recovery.record_success(&locator);
                    println!("\nFinished: {}", StatusDisplay::short_name(&locator));
                    return Ok(());
                }
                Some(SessionOutcome::Failed(e)) => {
                    println!();
                    match self.recovery.advise(&e) {
                        RecoveryAction::RetryUnlock(msg) => {
                            println!("Retrying: {}", msg);
                            self.gesture_unlock().await;
                        }
                        RecoveryAction::ReissuePlay(msg) => println!("Retrying: {}", msg),
                        RecoveryAction::GiveUp(msg) => {
                            println!("Giving up: {}", msg);
                            return Err(PlayerError::Playback(e));
                        }
                    }
                }
                None => {
                    println!("\nPlayback stopped");
                    return Ok(());
                }
            }
        }
    }

    /// Print progress until the session reports an outcome or Ctrl-C arrives
    async fn watch_progress(&self, rx: &mut mpsc::UnboundedReceiver<SessionOutcome>) -> Option<SessionOutcome> {
        let mut interval = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                outcome = rx.recv() => return outcome,
                _ = interval.tick() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        self.engine.stop();
                        return None;
                    }
                    print!("\r{}", StatusDisplay::compact_line(&self.engine.snapshot()));
                    let _ = std::io::stdout().flush();
                }
            }
        }
    }

    async fn run_shell(&mut self) -> Result<(), PlayerError> {
        println!("Gesture Audio v0.1.0{}", if self.simulation.is_some() { " (simulated output)" } else { "" });
        println!("Type 'help' for available commands, 'exit' or 'quit' to quit.");
        println!();

        // Blocking stdin lives on its own thread and feeds the select loop
        let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if line_tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let (outcome_tx, mut outcomes) = mpsc::unbounded_channel::<SessionOutcome>();
        let mut interval = tokio::time::interval(TICK);
        let mut awaiting_input = false;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            if !awaiting_input {
                print!("> ");
                let _ = std::io::stdout().flush();
                awaiting_input = true;
            }

            tokio::select! {
                biased;

                line = lines.recv() => {
                    awaiting_input = false;
                    let Some(line) = line else {
                        println!();
                        break;
                    };
                    if line.is_empty() {
                        continue;
                    }
                    match CliApp::parse_command(&line) {
                        Ok(ShellCommand::Quit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Ok(command) => {
                            if let Err(e) = self.execute_shell_command(command, &outcome_tx).await {
                                self.handle_error(&e);
                            }
                        }
                        Err(ParseError::HelpRequested) => CliApp::display_help(),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            println!("Type 'help' for available commands.");
                        }
                    }
                }

                Some(outcome) = outcomes.recv() => {
                    awaiting_input = false;
                    match outcome {
                        SessionOutcome::Ended { locator } => {
                            self.recovery.record_success(&locator);
                            println!("\nFinished: {}", StatusDisplay::short_name(&locator));
                        }
                        SessionOutcome::Failed(e) => {
                            let advice = self.recovery.advise(&e);
                            self.handle_error(&PlayerError::Playback(e));
                            println!("{}", advice.message());
                        }
                    }
                }

                _ = interval.tick() => {}
            }
        }

        self.close()
    }

    async fn execute_shell_command(
        &mut self,
        command: ShellCommand,
        outcome_tx: &mpsc::UnboundedSender<SessionOutcome>,
    ) -> Result<(), PlayerError> {
        match command {
            ShellCommand::Play { locator } => {
                let engine = self.engine.clone();
                let options = Self::play_options(None, None, &locator, outcome_tx.clone());
                println!("Loading: {}", StatusDisplay::short_name(&locator));
                tokio::spawn(async move {
                    if engine.play(&locator, options).await {
                        info!("Shell playback started: {}", locator);
                    }
                });
            }
            ShellCommand::Pause => {
                self.engine.pause();
                println!("OK: Paused");
            }
            ShellCommand::Resume => {
                if self.engine.resume().await {
                    println!("OK: Resumed");
                } else {
                    println!("Nothing to resume");
                }
            }
            ShellCommand::Stop => {
                self.engine.stop();
                println!("OK: Stopped");
            }
            ShellCommand::Seek { position } => {
                let position = CliApp::validate_seek_time(position, self.engine.duration())?;
                self.engine.seek(position.as_secs_f64());
                println!("Seeked to: {}", StatusDisplay::format_seconds(position.as_secs_f64()));
            }
            ShellCommand::Volume { level } => {
                let volume = level as f32 / 100.0;
                self.engine.set_volume(volume);
                self.config_manager.set_volume(volume)?;
                println!("OK: Volume {}%", level);
            }
            ShellCommand::Rate { rate } => {
                self.engine.set_playback_rate(rate);
                println!("OK: Rate {:.2}x", rate);
            }
            ShellCommand::Unlock => {
                if self.gesture_unlock().await {
                    println!("OK: Output unlocked");
                } else {
                    println!("Unlock refused: {}", self.recovery.advise_unlock_failure().message());
                }
            }
            ShellCommand::Status => StatusDisplay::display_full_status(&self.engine.snapshot()),
            ShellCommand::Events { count } => {
                StatusDisplay::display_events(&self.engine.logger().get_recent_events(count));
            }
            ShellCommand::Quit => {}
        }
        Ok(())
    }

    fn handle_error(&self, error: &PlayerError) {
        match error.severity() {
            ErrorSeverity::Info => info!("{}", error),
            ErrorSeverity::Warning => warn!("{}", error),
            ErrorSeverity::Error | ErrorSeverity::Critical => error!("{}", error),
        }
        StatusDisplay::display_error(error);
    }

    /// Release the output and persist the volume the user ended with
    fn close(&mut self) -> Result<(), PlayerError> {
        println!("Shutting down...");
        let volume = self.engine.volume();
        self.engine.destroy();

        if let Err(e) = self.config_manager.update_config(|config| config.default_volume = volume) {
            eprintln!("Warning: Error saving configuration: {}", e);
        }
        Ok(())
    }
}

fn configure(config_manager: &mut ConfigManager, action: ConfigAction) -> Result<(), PlayerError> {
    match action {
        ConfigAction::Show => {
            let config = config_manager.get_config();
            println!("Configuration ({}):", config_manager.config_path().display());
            println!("  readiness timeout:   {}ms", config.readiness_timeout_ms);
            println!("  readiness policy:    {}", config.readiness_policy.as_str());
            println!("  readiness threshold: {}", config.readiness_threshold.as_str());
            println!("  end epsilon:         {}s", config.end_epsilon_secs);
            println!("  default volume:      {}%", (config.default_volume * 100.0).round() as u8);
            println!(
                "  preferred device:    {}",
                config.preferred_device.as_deref().unwrap_or("(system default)")
            );
        }
        ConfigAction::Reset => {
            config_manager.reset_to_defaults()?;
            println!("OK: Configuration reset to defaults");
        }
        ConfigAction::Timeout { ms } => {
            config_manager.set_readiness_timeout(ms)?;
            println!("OK: Readiness timeout {}ms", ms);
        }
        ConfigAction::Policy { policy } => {
            let parsed = ReadinessPolicy::parse(&policy).ok_or_else(|| ParseError::InvalidArgument {
                argument: "readiness policy".to_string(),
                value: policy.clone(),
                expected: "optimistic or strict".to_string(),
            })?;
            config_manager.set_readiness_policy(parsed)?;
            println!("OK: Readiness policy {}", parsed.as_str());
        }
        ConfigAction::Volume { level } => {
            if level > 100 {
                return Err(ParseError::InvalidArgument {
                    argument: "volume level".to_string(),
                    value: level.to_string(),
                    expected: "0-100".to_string(),
                }
                .into());
            }
            config_manager.set_volume(level as f32 / 100.0)?;
            println!("OK: Default volume {}%", level);
        }
    }
    Ok(())
}

fn manage_devices(config_manager: &mut ConfigManager, action: DeviceAction) -> Result<(), PlayerError> {
    match action {
        DeviceAction::List => {
            let devices = NativeOutput::list_devices()?;
            if devices.is_empty() {
                println!("No audio devices found");
            } else {
                println!("Available audio devices:");
                let preferred = config_manager.get_config().preferred_device.clone();
                for device in devices {
                    let marker = if Some(&device) == preferred.as_ref() { "*" } else { " " };
                    println!("{} {}", marker, device);
                }
            }
        }
        DeviceAction::Set { device } => {
            config_manager.set_preferred_device(Some(device.clone()))?;
            println!("Audio device set to: {}", device);
        }
        DeviceAction::Clear => {
            config_manager.set_preferred_device(None)?;
            println!("Audio device reset to the system default");
        }
    }
    Ok(())
}

fn install_interrupt_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nReceived interrupt signal. Shutting down gracefully...");
        flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
    shutdown
}

/// Drive the simulated playhead in real time
fn spawn_simulation_clock(controller: SimulationController) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            controller.advance_by(TICK.as_secs_f64());
        }
    });
}

async fn run(cli: CliApp) -> Result<(), PlayerError> {
    let mut config_manager = ConfigManager::new()?;
    let command = cli.command.unwrap_or(Commands::Shell);

    match command {
        Commands::Config { action } => return configure(&mut config_manager, action),
        Commands::Device { action } => return manage_devices(&mut config_manager, action),
        _ => {}
    }

    let shutdown = install_interrupt_handler();
    let config = config_manager.get_config().clone();

    if cli.simulate {
        let autoplay = if cli.strict_autoplay {
            AutoplayPolicy::RequiresGesture
        } else {
            AutoplayPolicy::Permissive
        };
        let (output, controller) = SimulatedOutput::new(SimulationOptions {
            autoplay,
            ..SimulationOptions::default()
        });
        spawn_simulation_clock(controller.clone());

        let engine = PlaybackEngine::new(output, config)?;
        AppController::new(engine, config_manager, Some(controller), shutdown)
            .execute(command)
            .await
    } else {
        let output = NativeOutput::new(config.preferred_device.as_deref())?;
        info!("Using output device: {}", output.device_name());

        let engine = PlaybackEngine::new(output, config)?;
        AppController::new(engine, config_manager, None, shutdown)
            .execute(command)
            .await
    }
}

#[tokio::main]
async fn main() {
    if std::env::var(LOG_LEVEL_ENV).is_err() {
        std::env::set_var(LOG_LEVEL_ENV, "warn");
    }
    if let Err(e) = AudioLogger::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let cli = CliApp::parse();

    if let Err(e) = run(cli).await {
        error!("Fatal: {}", e);
        StatusDisplay::display_error(&e);
        std::process::exit(1);
    }

    info!("Application shutdown complete");
}
