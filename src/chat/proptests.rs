//! Property tests for the transcript streaming semantics.

use proptest::prelude::*;

use crate::chat::transcript::{Message, Sender, Transcript, PLACEHOLDER};

fn chunk_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(".{0,12}", 1..20)
}

proptest! {
    /// Chunks concatenate into one assistant entry in arrival order.
    #[test]
    fn chunks_concatenate_in_order(chunks in chunk_strategy()) {
        let mut t = Transcript::default();
        t.push_user("q");
        t.push_placeholder();
        for chunk in &chunks {
            t.apply_chunk(chunk);
        }

        prop_assert_eq!(t.messages().len(), 2);
        let last = t.last().unwrap();
        prop_assert_eq!(last.sender, Sender::Assistant);
        prop_assert_eq!(&last.text, &chunks.concat());
    }

    /// The placeholder is removed exactly once per response, no matter what
    /// the chunks contain (including a literal "...").
    #[test]
    fn placeholder_removed_exactly_once(chunks in chunk_strategy()) {
        let mut t = Transcript::default();
        t.push_user("q");
        t.push_placeholder();
        for chunk in &chunks {
            t.apply_chunk(chunk);
        }

        let placeholders = t
            .messages()
            .iter()
            .filter(|m| m.sender == Sender::Assistant && m.text == PLACEHOLDER)
            .count();
        // Only a genuine "..." payload may leave the sentinel text behind.
        if chunks.concat() == PLACEHOLDER {
            prop_assert_eq!(placeholders, 1);
        } else {
            prop_assert_eq!(placeholders, 0);
        }
        prop_assert_eq!(t.messages().len(), 2);
    }

    /// Loading history replaces the transcript wholesale; streaming state
    /// from before the load cannot leak into it.
    #[test]
    fn history_load_is_wholesale(history in prop::collection::vec(".{0,12}", 0..10)) {
        let mut t = Transcript::default();
        t.push_user("stale");
        t.push_placeholder();

        let loaded: Vec<Message> = history
            .iter()
            .enumerate()
            .map(|(i, text)| {
                if i % 2 == 0 {
                    Message::user(text.clone())
                } else {
                    Message::assistant(text.clone())
                }
            })
            .collect();
        t.replace(loaded.clone());

        prop_assert_eq!(t.messages(), loaded.as_slice());
    }
}
