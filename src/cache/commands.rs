//! Named command registry attached to a store.
//!
//! Lets a deployment register actions ("flush", "reseed", ...) that remote
//! tooling can trigger by name. Registration overwrites silently; execution
//! of an unknown name is the only failure mode.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use super::lock;

type Command = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no command with name `{name}`")]
    UnknownCommand { name: String },
}

/// Registry of named, argument-less actions.
pub struct Commands {
    list: RwLock<HashMap<String, Command>>,
}

impl Commands {
    pub fn new() -> Self {
        Self {
            list: RwLock::new(HashMap::new()),
        }
    }

    /// Register `action` under `name`, replacing any previous registration.
    pub fn assign(&self, name: impl Into<String>, action: impl Fn() + Send + Sync + 'static) {
        lock::write(&self.list, "assign").insert(name.into(), Box::new(action));
    }

    /// Run the command registered under `name`.
    pub fn execute(&self, name: &str) -> Result<(), CommandError> {
        let list = lock::read(&self.list, "execute");
        let command = list.get(name).ok_or_else(|| CommandError::UnknownCommand {
            name: name.to_string(),
        })?;
        command();
        Ok(())
    }

    /// Registered command names.
    pub fn names(&self) -> Vec<String> {
        lock::read(&self.list, "names").keys().cloned().collect()
    }
}

impl Default for Commands {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn assign_and_execute() {
        let commands = Commands::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        commands.assign("bump", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        commands.execute("bump").expect("registered command");
        commands.execute("bump").expect("registered command");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_command_fails() {
        let commands = Commands::new();
        let err = commands.execute("missing").expect_err("unknown");
        assert!(matches!(err, CommandError::UnknownCommand { .. }));
    }

    #[test]
    fn reassignment_replaces_the_action() {
        let commands = Commands::new();
        let hits = Arc::new(AtomicUsize::new(0));

        commands.assign("bump", || {});
        let counter = Arc::clone(&hits);
        commands.assign("bump", move || {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        commands.execute("bump").expect("registered command");
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(commands.names(), vec!["bump".to_string()]);
    }
}
