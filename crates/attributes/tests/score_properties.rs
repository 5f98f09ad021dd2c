use proptest::prelude::*;
use reframe_attributes::lexicon::{
    actionability, empathy, positivity, EMPATHY_KEYWORDS, POSITIVE_WORDS,
};

const ACTION_VERBS: [&str; 10] = [
    "can", "will", "could", "should", "try", "start", "practice", "focus", "work", "plan",
];

fn sentence_with(words: &[&str]) -> String {
    let mut text = String::from("Today");
    for word in words {
        text.push_str(" then ");
        text.push_str(word);
    }
    text.push('.');
    text
}

proptest! {
    #[test]
    fn actionability_is_monotone_and_clamps_at_three(verbs in prop::collection::vec(0usize..ACTION_VERBS.len(), 0..8)) {
        let words: Vec<&str> = verbs.iter().map(|i| ACTION_VERBS[*i]).collect();
        let mut previous = 0.0;
        for n in 0..=words.len() {
            let score = actionability(&sentence_with(&words[..n]));
            prop_assert!(score >= previous);
            let expected = (n as f64 / 3.0).min(1.0);
            prop_assert!((score - expected).abs() < 1e-12);
            if n >= 3 {
                prop_assert_eq!(score, 1.0);
            }
            previous = score;
        }
    }

    #[test]
    fn empathy_clamps_once_three_keywords_are_present(picks in prop::sample::subsequence((0..5usize).collect::<Vec<_>>(), 0..=5)) {
        let words: Vec<&str> = picks.iter().map(|i| EMPATHY_KEYWORDS[*i]).collect();
        let mut previous = 0.0;
        for n in 0..=words.len() {
            let score = empathy(&sentence_with(&words[..n]));
            prop_assert!(score >= previous);
            if n >= 3 {
                prop_assert_eq!(score, 1.0);
            }
            previous = score;
        }
    }

    #[test]
    fn positivity_clamps_once_four_words_are_present(picks in prop::sample::subsequence(vec![3usize, 4, 5, 6, 2], 0..=5)) {
        let words: Vec<&str> = picks.iter().map(|i| POSITIVE_WORDS[*i]).collect();
        let mut previous = 0.0;
        for n in 0..=words.len() {
            let score = positivity(&sentence_with(&words[..n]));
            prop_assert!(score >= previous);
            if n >= 4 {
                prop_assert_eq!(score, 1.0);
            } else {
                prop_assert!((score - n as f64 / 4.0).abs() < 1e-12);
            }
            previous = score;
        }
    }
}
