use chrono::{DateTime, Utc};

use crate::level::Level;

/// The place in the source code a log call was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl Caller {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }

    /// `path/to/file.rs:42`
    pub fn full_path(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }

    /// Like [`Caller::full_path`], but keeps only the file and its parent directory.
    pub fn trimmed_path(&self) -> String {
        let file = self.file.as_str();
        let trimmed = match file.rfind('/') {
            Some(last) => match file[..last].rfind('/') {
                Some(parent) => &file[parent + 1..],
                None => file,
            },
            None => file,
        };
        format!("{}:{}", trimmed, self.line)
    }
}

/// A single log event, as handed to the encoder. The fields of the event travel separately.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub level: Level,
    pub time: DateTime<Utc>,
    pub logger_name: String,
    pub message: String,
    pub caller: Option<Caller>,
    pub stack: String,
}

impl Entry {
    /// An entry stamped with the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            time: Utc::now(),
            logger_name: String::new(),
            message: message.into(),
            caller: None,
            stack: String::new(),
        }
    }

    #[must_use]
    pub fn with_time(self, time: DateTime<Utc>) -> Self {
        Self { time, ..self }
    }

    #[must_use]
    pub fn with_logger_name(self, logger_name: impl Into<String>) -> Self {
        Self {
            logger_name: logger_name.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_caller(self, caller: Caller) -> Self {
        Self {
            caller: Some(caller),
            ..self
        }
    }

    #[must_use]
    pub fn with_stack(self, stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Caller;
    use pretty_assertions::assert_eq;

    #[test]
    fn caller_paths() {
        let caller = Caller::new("/home/dev/project/src/server.rs", 42, "project::server");
        assert_eq!(caller.full_path(), "/home/dev/project/src/server.rs:42");
        assert_eq!(caller.trimmed_path(), "src/server.rs:42");
        assert_eq!(Caller::new("main.rs", 7, "").trimmed_path(), "main.rs:7");
        assert_eq!(Caller::new("src/main.rs", 7, "").trimmed_path(), "src/main.rs:7");
    }
}
