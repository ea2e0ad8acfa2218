use cybot::BotConfig;
use std::collections::HashMap;
use tracing_core::LevelFilter;
use tracing_subscriber::filter::Targets;
use std::{
    fs::File,
    io::Read,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone,Debug,serde::Serialize,serde::Deserialize)]
#[serde(rename_all="lowercase")]
pub enum BuiltinLogTarget
{
    Stdout,
    Stderr,
}

#[derive(Clone,Debug,serde::Serialize,serde::Deserialize)]
#[serde(untagged)]
pub enum LogTarget
{
    File { filename: PathBuf },
    Builtin(BuiltinLogTarget),
}

#[derive(Clone,Copy,Debug,PartialEq,Eq,serde::Serialize,serde::Deserialize)]
#[serde(rename_all ="lowercase")]
pub enum LogLevel
{
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

#[derive(Clone,Debug,serde::Deserialize)]
pub struct LogEntry
{
    pub target: LogTarget,
    #[serde(default)]
    pub modules: Vec<String>,
    pub level: Option<LogLevel>,
}

#[derive(Clone,Debug,serde::Deserialize)]
#[serde(rename_all="kebab-case")]
pub struct LoggingConfig
{
    /// Directory that file targets are written into
    #[serde(default="default_log_dir")]
    pub dir: PathBuf,
    pub default_level: Option<LogLevel>,
    #[serde(default)]
    pub module_levels: HashMap<String, LogLevel>,
    #[serde(default="default_targets")]
    pub targets: Vec<LogEntry>,
}

fn default_log_dir() -> PathBuf
{
    PathBuf::from("log")
}

fn default_targets() -> Vec<LogEntry>
{
    vec![LogEntry { target: LogTarget::Builtin(BuiltinLogTarget::Stdout), modules: Vec::new(), level: Some(LogLevel::Info) }]
}

impl Default for LoggingConfig
{
    fn default() -> Self
    {
        Self {
            dir: default_log_dir(),
            default_level: None,
            module_levels: HashMap::new(),
            targets: default_targets(),
        }
    }
}

impl LoggingConfig
{
    /// Whether any target writes to a file under `dir`
    pub fn uses_files(&self) -> bool
    {
        self.targets.iter().any(|t| matches!(t.target, LogTarget::File { .. }))
    }

    /// The filter applied before any target sees an event. Unconfigured modules
    /// pass at every level, leaving each target to apply its own.
    pub fn global_filter(&self) -> Targets
    {
        let default = self.default_level.unwrap_or(LogLevel::Trace);

        Targets::new()
            .with_default(LevelFilter::from(default))
            .with_targets(self.module_levels.iter().map(|(module, level)| (module.clone(), LevelFilter::from(*level))))
    }
}

impl LogEntry
{
    /// Most verbose level this target writes; everything if unset
    pub fn level_filter(&self) -> LevelFilter
    {
        self.level.map(LevelFilter::from).unwrap_or(LevelFilter::TRACE)
    }

    /// Whether events from `module` belong in this target
    pub fn covers_module(&self, module: Option<&str>) -> bool
    {
        match module
        {
            Some(module) if !self.modules.is_empty() => self.modules.iter().any(|m| module.starts_with(m.as_str())),
            _ => true,
        }
    }
}

/// The contents of a `cybot` configuration file
#[derive(Clone,Debug,serde::Deserialize)]
pub struct ServerConfig
{
    pub bot: BotConfig,
    #[serde(default)]
    pub log: LoggingConfig,
}

impl ServerConfig
{
    pub fn load_file<P: AsRef<Path>>(filename: P) -> Result<Self, anyhow::Error>
    {
        let mut file = File::open(filename)?;
        let mut config = String::new();
        file.read_to_string(&mut config)?;
        Self::parse(&config)
    }

    pub fn parse(config: &str) -> Result<Self, anyhow::Error>
    {
        Ok(json5::from_str(config)?)
    }
}

impl From<LogLevel> for LevelFilter
{
    fn from(arg: LogLevel) -> LevelFilter
    {
        match arg
        {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info  => LevelFilter::INFO,
            LogLevel::Warn  => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off   => LevelFilter::OFF,
        }
    }
}
