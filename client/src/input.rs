//! Local player commands and the input lock held during transitions

use log::debug;

/// A command typed by the local player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reached the level's finish trigger
    Finish,
    /// Hit a fail trigger
    Fail,
    /// Picked up the key with this id
    Collect(String),
    Status,
    Quit,
}

impl Command {
    /// Parses one line of console input
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim().to_ascii_lowercase();
        let mut words = line.split_whitespace();
        let head = words.next()?;
        if head == "k" || head == "key" {
            return words.next().map(|id| Command::Collect(id.to_string()));
        }

        match head {
            "f" | "finish" => Some(Command::Finish),
            "x" | "fail" => Some(Command::Fail),
            "s" | "status" => Some(Command::Status),
            "q" | "quit" => Some(Command::Quit),
            _ => None,
        }
    }

    /// Gameplay commands are dropped while a scene transition holds the lock
    pub fn is_gameplay(&self) -> bool {
        matches!(self, Command::Finish | Command::Fail | Command::Collect(_))
    }
}

/// Gates gameplay commands on the transition agent's input lock
#[derive(Debug, Default)]
pub struct InputManager {
    locked: bool,
    dropped: u32,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of gameplay commands dropped because input was locked
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Returns the command if it may be acted on right now
    pub fn filter(&mut self, command: Command) -> Option<Command> {
        if self.locked && command.is_gameplay() {
            debug!("Input locked, dropping {:?}", command);
            self.dropped += 1;
            return None;
        }
        Some(command)
    }
}
