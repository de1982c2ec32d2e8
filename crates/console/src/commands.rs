//! Saved commands and autocomplete

use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{get_json, keys, put_json, KvStore};

/// Commands every server starts with
pub const DEFAULT_COMMANDS: [&str; 6] = ["start", "stop", "restart", "status", "save", "backup"];

/// Distinct, insertion-ordered command set for one server
pub struct SavedCommands {
    server_id: String,
    commands: Vec<String>,
    store: Arc<dyn KvStore>,
}

impl SavedCommands {
    pub fn load(store: Arc<dyn KvStore>, server_id: &str) -> Result<Self, StoreError> {
        let commands = get_json::<Vec<String>>(store.as_ref(), &keys::commands(server_id))?
            .unwrap_or_else(|| DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect());
        Ok(Self {
            server_id: server_id.to_string(),
            commands,
            store,
        })
    }

    pub fn all(&self) -> &[String] {
        &self.commands
    }

    pub fn contains(&self, command: &str) -> bool {
        self.commands.iter().any(|c| c == command)
    }

    /// Remember `command`. Returns false when it was already saved.
    pub fn insert(&mut self, command: &str) -> Result<bool, StoreError> {
        if self.contains(command) {
            return Ok(false);
        }
        self.commands.push(command.to_string());
        put_json(self.store.as_ref(), &keys::commands(&self.server_id), &self.commands)?;
        Ok(true)
    }

    /// Saved commands containing `input`, case-insensitively, in saved order
    pub fn matching(&self, input: &str) -> Vec<String> {
        if input.trim().is_empty() {
            return Vec::new();
        }
        let needle = input.to_lowercase();
        self.commands
            .iter()
            .filter(|c| c.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}

/// Direction for cycling the highlighted suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Forward,
    Backward,
}

/// Candidate list with a highlighted entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Autocomplete {
    candidates: Vec<String>,
    highlighted: Option<usize>,
}

impl Autocomplete {
    /// Replace the candidates. The highlight goes back to the first match
    /// only when the set actually changed.
    pub fn update(&mut self, candidates: Vec<String>) {
        if candidates == self.candidates {
            return;
        }
        self.highlighted = if candidates.is_empty() { None } else { Some(0) };
        self.candidates = candidates;
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.highlighted
            .and_then(|i| self.candidates.get(i))
            .map(String::as_str)
    }

    /// Move the highlight, wrapping at both ends
    pub fn cycle(&mut self, direction: Cycle) {
        let count = self.candidates.len();
        if count == 0 {
            return;
        }
        let next = match (self.highlighted, direction) {
            (None, Cycle::Forward) => 0,
            (None, Cycle::Backward) => count - 1,
            (Some(i), Cycle::Forward) => (i + 1) % count,
            (Some(i), Cycle::Backward) => (i + count - 1) % count,
        };
        self.highlighted = Some(next);
    }

    /// Close the list without executing anything
    pub fn dismiss(&mut self) {
        self.candidates.clear();
        self.highlighted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn saved() -> SavedCommands {
        SavedCommands::load(Arc::new(MemoryStore::new()), "pz-01").unwrap()
    }

    #[test]
    fn seeded_with_defaults() {
        let commands = saved();
        assert_eq!(commands.all(), &DEFAULT_COMMANDS.map(String::from));
    }

    #[test]
    fn matching_is_case_insensitive_substring_in_order() {
        let mut commands = saved();
        commands.insert("servermsg \"Restart soon\"").unwrap();

        assert_eq!(
            commands.matching("ST"),
            vec!["start", "stop", "restart", "status", "servermsg \"Restart soon\""]
        );
        assert_eq!(commands.matching("res"), vec!["restart", "servermsg \"Restart soon\""]);
        assert_eq!(commands.matching("back"), vec!["backup"]);
        assert!(commands.matching("zzz").is_empty());
    }

    #[test]
    fn matching_blank_input_is_empty() {
        let commands = saved();
        assert!(commands.matching("").is_empty());
        assert!(commands.matching("   ").is_empty());
    }

    #[test]
    fn insert_deduplicates_and_persists() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut commands = SavedCommands::load(store.clone(), "pz-01").unwrap();

        assert!(!commands.insert("save").unwrap());
        assert!(commands.insert("players").unwrap());
        assert!(!commands.insert("players").unwrap());

        let reloaded = SavedCommands::load(store, "pz-01").unwrap();
        assert_eq!(reloaded.all().len(), DEFAULT_COMMANDS.len() + 1);
        assert_eq!(reloaded.all().last().map(String::as_str), Some("players"));
    }

    #[test]
    fn cycling_wraps_both_ends() {
        let mut ac = Autocomplete::default();
        ac.update(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(ac.highlighted(), Some("a"));

        ac.cycle(Cycle::Backward);
        assert_eq!(ac.highlighted(), Some("c"));
        ac.cycle(Cycle::Forward);
        assert_eq!(ac.highlighted(), Some("a"));
        ac.cycle(Cycle::Forward);
        ac.cycle(Cycle::Forward);
        ac.cycle(Cycle::Forward);
        assert_eq!(ac.highlighted(), Some("a"));
    }

    #[test]
    fn highlight_resets_only_when_candidates_change() {
        let mut ac = Autocomplete::default();
        ac.update(vec!["start".into(), "restart".into()]);
        ac.cycle(Cycle::Forward);
        assert_eq!(ac.highlighted(), Some("restart"));

        ac.update(vec!["start".into(), "restart".into()]);
        assert_eq!(ac.highlighted(), Some("restart"));

        ac.update(vec!["stop".into(), "restart".into()]);
        assert_eq!(ac.highlighted(), Some("stop"));
    }

    #[test]
    fn dismiss_closes_list() {
        let mut ac = Autocomplete::default();
        ac.update(vec!["save".into()]);
        ac.dismiss();
        assert!(ac.candidates().is_empty());
        assert_eq!(ac.highlighted(), None);
        ac.cycle(Cycle::Forward);
        assert_eq!(ac.highlighted(), None);
    }
}
