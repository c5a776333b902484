//! Predefined system prompts selectable by key

/// Built-in prompt presets as `(key, prompt)` pairs, in display order
pub const PREDEFINED_PROMPTS: [(&str, &str); 4] = [
    (
        "teacher",
        "You are a patient teacher. Explain concepts step by step, check for \
         understanding and use simple examples before introducing details.",
    ),
    (
        "french",
        "Tu es un assistant francophone. Réponds toujours en français, de \
         manière claire et concise.",
    ),
    (
        "coder",
        "You are an expert software engineer. Give precise, working code, \
         explain trade-offs briefly and point out edge cases.",
    ),
    (
        "writer",
        "You are a skilled writer and editor. Help craft clear, engaging prose \
         and suggest improvements to style, structure and tone.",
    ),
];

/// Look up a predefined prompt by key
pub fn get(key: &str) -> Option<&'static str> {
    PREDEFINED_PROMPTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, prompt)| *prompt)
}

/// All predefined prompt keys
pub fn keys() -> impl Iterator<Item = &'static str> {
    PREDEFINED_PROMPTS.iter().map(|(key, _)| *key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(get("coder").unwrap().contains("software engineer"));
        assert!(get("pirate").is_none());
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<_> = keys().collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 4);
    }
}
