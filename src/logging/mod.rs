use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file_path: Option<PathBuf>,
    pub enable_console: bool,
    pub enable_file: bool,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub target: String,
    pub message: String,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Per-request fields stamped onto every entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogContext {
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

pub trait LogAppender: Send + Sync {
    fn append(&self, formatted: &str) -> Result<()>;
    fn flush(&self) -> Result<()>;
}

pub trait LogFilter: Send + Sync {
    fn should_log(&self, entry: &LogEntry) -> bool;
}

pub trait LogFormatter: Send + Sync {
    fn format(&self, entry: &LogEntry) -> String;
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file_path: None,
            enable_console: true,
            enable_file: false,
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    /// Silent configuration for tests.
    pub fn disabled() -> Self {
        Self {
            enable_console: false,
            ..Self::default()
        }
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            LogLevel::Error => 1,
            LogLevel::Warn => 2,
            LogLevel::Info => 3,
            LogLevel::Debug => 4,
        }
    }
}

impl LogEntry {
    pub fn new(level: LogLevel, target: &str, message: &str, context: &LogContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            target: target.to_string(),
            message: message.to_string(),
            user_id: context.user_id.clone(),
            request_id: context.request_id.clone(),
            metadata: context.metadata.clone(),
        }
    }
}

struct ConsoleAppender;

impl LogAppender for ConsoleAppender {
    fn append(&self, formatted: &str) -> Result<()> {
        eprintln!("{formatted}");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

struct FileAppender {
    file: Mutex<File>,
}

impl FileAppender {
    fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogAppender for FileAppender {
    fn append(&self, formatted: &str) -> Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{formatted}")?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.flush()?;
        Ok(())
    }
}

struct LevelFilter {
    max_priority: u8,
}

impl LogFilter for LevelFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        entry.level.priority() <= self.max_priority
    }
}

struct JsonFormatter;

impl LogFormatter for JsonFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        serde_json::to_string(entry).unwrap_or_else(|_| entry.message.clone())
    }
}

struct TextFormatter;

impl LogFormatter for TextFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut line = format!(
            "{} [{}] {}: {}",
            entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            entry.level.as_str(),
            entry.target,
            entry.message
        );
        if let Some(user) = &entry.user_id {
            line.push_str(&format!(" user={user}"));
        }
        if let Some(req) = &entry.request_id {
            line.push_str(&format!(" request={req}"));
        }
        line
    }
}

pub struct Logger {
    context: Arc<RwLock<LogContext>>,
    appenders: Vec<Box<dyn LogAppender>>,
    filters: Vec<Box<dyn LogFilter>>,
    formatter: Box<dyn LogFormatter>,
}

impl Logger {
    pub fn new(config: LogConfig) -> Result<Self> {
        let mut appenders: Vec<Box<dyn LogAppender>> = Vec::new();
        if config.enable_console {
            appenders.push(Box::new(ConsoleAppender));
        }
        if config.enable_file {
            if let Some(path) = &config.file_path {
                appenders.push(Box::new(FileAppender::new(path.clone())?));
            }
        }

        let filters: Vec<Box<dyn LogFilter>> = vec![Box::new(LevelFilter {
            max_priority: config.level.priority(),
        })];

        let formatter: Box<dyn LogFormatter> = match config.format {
            LogFormat::Json => Box::new(JsonFormatter),
            LogFormat::Text => Box::new(TextFormatter),
        };

        Ok(Self {
            context: Arc::new(RwLock::new(LogContext::default())),
            appenders,
            filters,
            formatter,
        })
    }

    /// Logger that writes nowhere, for tests and embedding.
    pub fn disabled() -> Self {
        // No appenders, no files touched: the constructor cannot fail.
        Self::new(LogConfig::disabled()).unwrap_or_else(|_| Self {
            context: Arc::new(RwLock::new(LogContext::default())),
            appenders: Vec::new(),
            filters: Vec::new(),
            formatter: Box::new(TextFormatter),
        })
    }

    pub async fn log(&self, level: LogLevel, target: &str, message: &str) -> Result<()> {
        let context = self.context.read().await;
        let entry = LogEntry::new(level, target, message, &context);
        drop(context);

        for filter in &self.filters {
            if !filter.should_log(&entry) {
                return Ok(());
            }
        }
        let formatted = self.formatter.format(&entry);
        for appender in &self.appenders {
            appender.append(&formatted)?;
        }
        Ok(())
    }

    pub async fn error(&self, target: &str, message: &str) -> Result<()> {
        self.log(LogLevel::Error, target, message).await
    }

    pub async fn warn(&self, target: &str, message: &str) -> Result<()> {
        self.log(LogLevel::Warn, target, message).await
    }

    pub async fn info(&self, target: &str, message: &str) -> Result<()> {
        self.log(LogLevel::Info, target, message).await
    }

    pub async fn debug(&self, target: &str, message: &str) -> Result<()> {
        self.log(LogLevel::Debug, target, message).await
    }

    pub async fn set_context(&self, context: LogContext) {
        *self.context.write().await = context;
    }

    pub async fn update_context<F>(&self, f: F)
    where
        F: FnOnce(&mut LogContext),
    {
        let mut context = self.context.write().await;
        f(&mut context);
    }

    pub async fn flush(&self) -> Result<()> {
        for appender in &self.appenders {
            appender.flush()?;
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $target:expr, $($arg:tt)*) => {
        let _ = $logger.error($target, &format!($($arg)*)).await;
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $target:expr, $($arg:tt)*) => {
        let _ = $logger.warn($target, &format!($($arg)*)).await;
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $target:expr, $($arg:tt)*) => {
        let _ = $logger.info($target, &format!($($arg)*)).await;
    };
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $target:expr, $($arg:tt)*) => {
        let _ = $logger.debug($target, &format!($($arg)*)).await;
    };
}
