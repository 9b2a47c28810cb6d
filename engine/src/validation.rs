//! Content policy and viewer permissions.
//!
//! Every user-initiated mutation is checked here before any optimistic
//! state is written, so a rejected action never reaches the store.

use crate::{entity::Author, error::Result, Entity, Error, UserId};
use serde::{Deserialize, Serialize};

/// The person looking at the thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub id: UserId,
    pub name: String,
    /// Logged-in participant (guests can read but not write)
    #[serde(default)]
    pub is_user: bool,
    /// May delete other people's comments
    #[serde(default)]
    pub is_moderator: bool,
}

impl Viewer {
    /// A regular participant.
    pub fn user(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_user: true,
            is_moderator: false,
        }
    }

    /// A read-only visitor.
    pub fn guest() -> Self {
        Self {
            id: 0,
            name: String::new(),
            is_user: false,
            is_moderator: false,
        }
    }

    pub fn moderator(mut self) -> Self {
        self.is_moderator = true;
        self
    }

    /// Author reference stamped on optimistic entities.
    pub fn author(&self) -> Author {
        Author::new(self.id, self.name.clone())
    }
}

/// Length and wording rules for comment content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPolicy {
    max_len: usize,
    /// Lowercased
    reserved_words: Vec<String>,
}

impl ContentPolicy {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            reserved_words: Vec::new(),
        }
    }

    /// Builder form of [`ContentPolicy::set_reserved_words`].
    pub fn with_reserved_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_reserved_words(words);
        self
    }

    /// Replace the reserved word list. Blank entries are dropped.
    pub fn set_reserved_words<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reserved_words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
    }

    pub fn reserved_words(&self) -> &[String] {
        &self.reserved_words
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Check content alone.
    pub fn check(&self, content: &str) -> Result<()> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyContent);
        }

        let len = trimmed.chars().count();
        if len > self.max_len {
            return Err(Error::ContentTooLong {
                len,
                max: self.max_len,
            });
        }

        let lowered = trimmed.to_lowercase();
        if let Some(word) = self.reserved_words.iter().find(|w| lowered.contains(w.as_str())) {
            return Err(Error::ReservedWord(word.clone()));
        }

        Ok(())
    }

    /// Check a new comment or reply.
    pub fn check_create(&self, viewer: &Viewer, content: &str) -> Result<()> {
        if !viewer.is_user {
            return Err(Error::NotPermitted("only participants can comment".into()));
        }
        self.check(content)
    }

    /// Check an edit of `entity`.
    pub fn check_edit(&self, viewer: &Viewer, entity: &Entity, content: &str) -> Result<()> {
        if !entity.is_authored_by(viewer.id) {
            return Err(Error::NotPermitted("only the author can edit".into()));
        }
        self.check(content)
    }

    /// Check a deletion of `entity`.
    pub fn check_delete(&self, viewer: &Viewer, entity: &Entity) -> Result<()> {
        if entity.is_authored_by(viewer.id) || viewer.is_moderator {
            Ok(())
        } else {
            Err(Error::NotPermitted(
                "only the author or a moderator can delete".into(),
            ))
        }
    }
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own_comment(viewer: &Viewer) -> Entity {
        Entity::new(1, "mine", 0).with_author(viewer.author())
    }

    #[test]
    fn empty_and_blank_content_rejected() {
        let policy = ContentPolicy::default();
        assert_eq!(policy.check(""), Err(Error::EmptyContent));
        assert_eq!(policy.check("   \n"), Err(Error::EmptyContent));
    }

    #[test]
    fn length_limit_is_inclusive() {
        let policy = ContentPolicy::new(5);
        assert!(policy.check("hello").is_ok());
        assert_eq!(
            policy.check("hello!"),
            Err(Error::ContentTooLong { len: 6, max: 5 })
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let policy = ContentPolicy::new(3);
        assert!(policy.check("ñáé").is_ok());
    }

    #[test]
    fn reserved_words_match_case_insensitively() {
        let policy = ContentPolicy::default().with_reserved_words(["Spam", " ", "scam"]);
        assert_eq!(policy.reserved_words().len(), 2);
        assert_eq!(
            policy.check("Buy SPAM now"),
            Err(Error::ReservedWord("spam".into()))
        );
        assert!(policy.check("Nice flat").is_ok());
    }

    #[test]
    fn guests_cannot_create() {
        let policy = ContentPolicy::default();
        assert!(matches!(
            policy.check_create(&Viewer::guest(), "hi"),
            Err(Error::NotPermitted(_))
        ));
        assert!(policy.check_create(&Viewer::user(1, "Ann"), "hi").is_ok());
    }

    #[test]
    fn only_author_edits() {
        let policy = ContentPolicy::default();
        let ann = Viewer::user(1, "Ann");
        let bob = Viewer::user(2, "Bob");
        let comment = own_comment(&ann);
        assert!(policy.check_edit(&ann, &comment, "changed").is_ok());
        assert!(policy.check_edit(&bob, &comment, "changed").is_err());
    }

    #[test]
    fn moderator_may_delete_others() {
        let policy = ContentPolicy::default();
        let ann = Viewer::user(1, "Ann");
        let comment = own_comment(&ann);
        assert!(policy.check_delete(&ann, &comment).is_ok());
        assert!(policy.check_delete(&Viewer::user(2, "Bob"), &comment).is_err());
        assert!(policy
            .check_delete(&Viewer::user(3, "Mod").moderator(), &comment)
            .is_ok());
    }
}
