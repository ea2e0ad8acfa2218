use cybot::RunOutcome;
use cybot_server::run::{run_bot, Overrides};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab")]
struct Opts {
    /// Config file location
    #[structopt(short, long, default_value = "cybot.json5")]
    config: PathBuf,

    /// Server to connect to, as host:port
    #[structopt(short, long)]
    server: Option<String>,

    /// Nickname for the bot
    #[structopt(short, long)]
    nick: Option<String>,

    /// Password for the bot
    #[structopt(short, long)]
    pass: Option<String>,

    /// Take over the connection of an already running bot, if there is one
    #[structopt(long)]
    hijack: bool,
}

pub fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();

    let overrides = Overrides {
        host: opts.server,
        nick: opts.nick,
        password: opts.pass,
        hijack: opts.hijack,
    };

    match run_bot(opts.config, overrides)? {
        RunOutcome::Disconnected(Some(e)) => Err(e.into()),
        _ => Ok(()),
    }
}
