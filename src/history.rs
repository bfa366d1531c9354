//! Command recall buffer.
//!
//! Every non-empty submission is appended, duplicates included. Recall walks
//! a cursor over the entries without ever changing them; the cursor is reset
//! by each new submission.

#[derive(Debug, Default, Clone)]
pub struct CommandHistory {
    entries: Vec<String>,
    /// Steps back from the newest entry; `None` when not recalling.
    cursor: Option<usize>,
    /// What the user had typed before recall started.
    draft: String,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: impl Into<String>) {
        self.entries.push(command.into());
        self.reset();
    }

    pub fn reset(&mut self) {
        self.cursor = None;
        self.draft.clear();
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recall position as the classic index: `-1` when not recalling.
    pub fn index(&self) -> isize {
        self.cursor.map_or(-1, |c| c as isize)
    }

    /// Moves one entry older. `live` is the current input line, kept so that
    /// walking back past the newest entry restores it. Returns the text to
    /// show, or `None` when already at the oldest entry (or nothing to recall).
    pub fn older(&mut self, live: &str) -> Option<String> {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next >= self.entries.len() {
            return None;
        }
        if self.cursor.is_none() {
            self.draft = live.to_string();
        }
        self.cursor = Some(next);
        Some(self.entry_at(next))
    }

    /// Moves one entry newer. Leaving the newest entry returns the saved draft.
    pub fn newer(&mut self) -> Option<String> {
        match self.cursor? {
            0 => {
                self.cursor = None;
                Some(std::mem::take(&mut self.draft))
            }
            c => {
                self.cursor = Some(c - 1);
                Some(self.entry_at(c - 1))
            }
        }
    }

    fn entry_at(&self, steps_back: usize) -> String {
        self.entries[self.entries.len() - 1 - steps_back].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_up_down_walks_back_then_forward() {
        let mut h = CommandHistory::new();
        h.push("a");
        h.push("b");
        assert_eq!(h.older("").as_deref(), Some("b"));
        assert_eq!(h.older("").as_deref(), Some("a"));
        assert_eq!(h.newer().as_deref(), Some("b"));
        assert_eq!(h.index(), 0);
    }

    #[test]
    fn older_is_bounded_at_oldest() {
        let mut h = CommandHistory::new();
        h.push("only");
        assert_eq!(h.older("").as_deref(), Some("only"));
        assert_eq!(h.older(""), None);
        assert_eq!(h.index(), 0);
    }

    #[test]
    fn newer_past_newest_restores_draft() {
        let mut h = CommandHistory::new();
        h.push("a");
        assert_eq!(h.older("half typed").as_deref(), Some("a"));
        assert_eq!(h.newer().as_deref(), Some("half typed"));
        assert_eq!(h.index(), -1);
        assert_eq!(h.newer(), None);
    }

    #[test]
    fn empty_history_recalls_nothing() {
        let mut h = CommandHistory::new();
        assert_eq!(h.older("typed"), None);
        assert_eq!(h.newer(), None);
        assert_eq!(h.index(), -1);
    }

    #[test]
    fn recall_does_not_mutate_entries_and_push_resets_cursor() {
        let mut h = CommandHistory::new();
        h.push("x");
        h.push("x");
        h.older("");
        h.older("");
        assert_eq!(h.entries(), ["x", "x"]);
        h.push("y");
        assert_eq!(h.index(), -1);
        assert_eq!(h.len(), 3);
    }
}
