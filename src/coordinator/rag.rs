//! Retrieval of prior records to ground a chat reply

use crate::error::StoreError;
use crate::store::{MemoryRecord, MemoryStore};
use std::collections::HashSet;

/// Keywords searched per utterance
const MAX_KEYWORDS: usize = 3;

/// Matches kept per keyword
const HITS_PER_KEYWORD: usize = 3;

const STOP_WORDS: &[&str] = &[
    // English
    "a", "about", "am", "an", "and", "are", "as", "at", "be", "but", "by", "can", "did", "do",
    "does", "for", "from", "had", "has", "have", "he", "her", "him", "his", "how", "i", "if",
    "in", "is", "it", "its", "just", "me", "my", "no", "not", "of", "on", "or", "our", "she",
    "so", "that", "the", "their", "them", "then", "there", "they", "this", "to", "today", "too",
    "was", "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "you",
    "your",
    // Chinese
    "的", "了", "是", "我", "你", "他", "她", "它", "們", "们", "在", "有", "和", "就", "不",
    "也", "都", "很", "嗎", "吗", "呢", "吧", "啊", "這", "这", "那", "今天", "什麼", "什么",
];

/// Pick up to three distinct search terms from an utterance
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| c.is_ascii_punctuation() || "，。！？、；：「」“”".contains(c))
            .to_lowercase();
        if word.chars().count() < 2 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        if !keywords.contains(&word) {
            keywords.push(word);
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// Keyword matches first, then the most recent records, without
/// duplicates and capped at `limit`
pub fn retrieve(
    store: &MemoryStore,
    text: &str,
    limit: usize,
) -> Result<Vec<MemoryRecord>, StoreError> {
    let mut seen = HashSet::new();
    let mut context = Vec::new();

    for keyword in extract_keywords(text) {
        for record in store.search(&keyword, HITS_PER_KEYWORD)? {
            if seen.insert(record.id) {
                context.push(record);
            }
        }
    }
    for record in store.latest_n(limit)? {
        if seen.insert(record.id) {
            context.push(record);
        }
    }

    context.truncate(limit);
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewMemory;

    #[test]
    fn test_extract_keywords_filters_stop_words() {
        assert_eq!(
            extract_keywords("What did I eat at the Garden cafe, garden party?"),
            vec!["eat", "garden", "cafe"]
        );
        assert!(extract_keywords("I am so ... a").is_empty());
    }

    #[test]
    fn test_extract_keywords_keeps_unspaced_text() {
        assert_eq!(extract_keywords("我 今天 去了公園。"), vec!["去了公園"]);
    }

    #[test]
    fn test_retrieve_merges_and_bounds() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.append(&NewMemory::chat("walked the dog in the park")).unwrap();
        for i in 0..4 {
            store.append(&NewMemory::chat(format!("note {}", i))).unwrap();
        }

        let context = retrieve(&store, "how was the park", 3).unwrap();
        assert_eq!(context.len(), 3);
        // Keyword hit leads, followed by the newest records
        assert_eq!(context[0].transcript, "walked the dog in the park");
        assert_eq!(context[1].transcript, "note 3");
        assert_eq!(context[2].transcript, "note 2");
    }

    #[test]
    fn test_retrieve_deduplicates() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.append(&NewMemory::chat("dinner with Ana")).unwrap();

        let context = retrieve(&store, "dinner dinner Ana", 5).unwrap();
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_retrieve_empty_store() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert!(retrieve(&store, "anything", 5).unwrap().is_empty());
    }
}
