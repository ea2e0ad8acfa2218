use crate::{commands, ServerConfig};
use cybot::{Bot, RunOutcome};

use std::{path::Path, sync::Arc};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::util::SubscriberInitExt;

/// Command-line adjustments applied on top of the configuration file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub host: Option<String>,
    pub nick: Option<String>,
    pub password: Option<String>,
    pub hijack: bool,
}

impl Overrides {
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.bot.host = host;
        }
        if let Some(nick) = self.nick {
            config.bot.nick = nick;
        }
        if let Some(password) = self.password {
            config.bot.password = Some(password);
        }
        if self.hijack {
            config.bot.hijack_session = true;
        }
    }
}

/// Stop the bot on SIGINT or SIGTERM. SIGUSR1 withdraws the offer to hand the
/// session to a successor.
fn watch_signals(bot: Arc<Bot>) -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    tracing::info!("Interrupted; shutting down");
                    bot.stop();
                }
                _ = terminate.recv() => {
                    tracing::info!("Terminated; shutting down");
                    bot.stop();
                }
                _ = user1.recv() => {
                    tracing::info!("No longer accepting a successor");
                    bot.close();
                }
            }
        }
    });

    Ok(())
}

async fn do_run_bot(config: ServerConfig) -> Result<RunOutcome, anyhow::Error> {
    crate::build_subscriber(config.log.clone())?.init();

    let bot = Bot::new(config.bot);
    for trigger in commands::all() {
        bot.add_trigger(trigger);
    }

    watch_signals(Arc::clone(&bot))?;

    let outcome = bot.run().await?;
    tracing::info!(?outcome, "Bot shutting down");
    Ok(outcome)
}

/// Run a bot from the configuration file at `config_path` until its session
/// ends.
///
/// Note that this function will create a new tokio runtime. It should not be
/// called if one is already active.
pub fn run_bot(
    config_path: impl AsRef<Path>,
    overrides: Overrides,
) -> Result<RunOutcome, anyhow::Error> {
    // Load the config before starting anything, so errors are reported early
    let mut config = ServerConfig::load_file(config_path)?;
    overrides.apply(&mut config);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(do_run_bot(config))
}
