//! Prompt text for the three generation calls.

use crate::attribute::ControlAttribute;
use rand::seq::SliceRandom;
use rand::Rng;
use reframe_protocol::ExampleRecord;

pub const CLASSIFY_SYSTEM: &str = "You are an expert in identifying cognitive distortions.";
pub const GENERATE_SYSTEM: &str =
    "You are a cognitive therapist helping people reframe negative thoughts.";

const CLASSIFY_EXEMPLARS: [(&str, &str); 5] = [
    ("Everyone will hate me", "Mind Reading (85%)"),
    ("I will fail again", "Fortune Telling (90%)"),
    ("I am completely worthless", "Labeling (80%)"),
    ("If it's not perfect, it's a failure", "All-or-Nothing Thinking (75%)"),
    ("The worst will happen", "Catastrophizing (88%)"),
];

/// Builds the user-message text for classify, generate and rewrite.
pub struct PromptAssembler;

impl PromptAssembler {
    /// Fixed five-example few-shot block followed by the query.
    #[must_use]
    pub fn classify(thought: &str, situation: &str) -> String {
        let mut prompt = String::from("Here are examples of cognitive distortion classification:\n\n");
        for (example, label) in CLASSIFY_EXEMPLARS {
            prompt.push_str(&format!(
                "Thought: \"{example}\"\nCognitive Distortion: {label}\n\n"
            ));
        }
        prompt.push_str(&format!(
            "---\n\nSituation: {situation}\nThought: {thought}\nCognitive Distortion:"
        ));
        prompt
    }

    /// Few-shot block of the retrieved examples in a fresh random order, then the query stub.
    pub fn generate<'a, R, I>(thought: &str, situation: &str, examples: I, rng: &mut R) -> String
    where
        R: Rng + ?Sized,
        I: IntoIterator<Item = &'a ExampleRecord>,
    {
        let mut examples: Vec<&ExampleRecord> = examples.into_iter().collect();
        examples.shuffle(rng);

        let mut prompt = String::new();
        for example in examples {
            prompt.push_str(&format!(
                "Situation: {}\nDistorted Thought: {}\nRational Response: {}\n\n",
                example.situation, example.thought, example.reframe
            ));
        }
        prompt.push_str(&format!(
            "Situation: {situation}\nDistorted Thought: {thought}\nRational Response:"
        ));
        prompt
    }

    #[must_use]
    pub fn rewrite(
        attribute: ControlAttribute,
        reframe: &str,
        thought: &str,
        situation: &str,
    ) -> String {
        match attribute {
            ControlAttribute::Empathy => format!(
                "Make the following reframed thought more empathic.\n\
                 Acknowledge feelings and provide emotional support.\n\n\
                 Original: {reframe}\nMore Empathic:"
            ),
            ControlAttribute::Actionability => format!(
                "Add specific actionable steps to the following reframed thought.\n\n\
                 Original: {reframe}\nMore Actionable:"
            ),
            ControlAttribute::Specificity => format!(
                "Make the following reframed thought more specific to the situation.\n\n\
                 Situation: {situation}\nThought: {thought}\nReframe: {reframe}\n\n\
                 More Specific:"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record(n: usize) -> ExampleRecord {
        ExampleRecord {
            situation: format!("situation {n}"),
            thought: format!("thought {n}"),
            reframe: format!("reframe {n}"),
        }
    }

    #[test]
    fn classify_prompt_ends_with_query() {
        let prompt = PromptAssembler::classify("I will fail", "Exam");
        assert!(prompt.starts_with("Here are examples of cognitive distortion classification:\n\n"));
        assert!(prompt.contains("Thought: \"Everyone will hate me\"\nCognitive Distortion: Mind Reading (85%)\n\n"));
        assert!(prompt.contains("Cognitive Distortion: Catastrophizing (88%)\n\n---\n\n"));
        assert!(prompt.ends_with("Situation: Exam\nThought: I will fail\nCognitive Distortion:"));
        assert_eq!(prompt.matches("Cognitive Distortion:").count(), 6);
    }

    #[test]
    fn generate_prompt_contains_every_example_once() {
        let records: Vec<ExampleRecord> = (0..5).map(record).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let prompt = PromptAssembler::generate("I'm a failure", "Lost my job", &records, &mut rng);

        for r in &records {
            let block = format!(
                "Situation: {}\nDistorted Thought: {}\nRational Response: {}\n\n",
                r.situation, r.thought, r.reframe
            );
            assert_eq!(prompt.matches(&block).count(), 1, "{block}");
        }
        assert!(prompt.ends_with(
            "Situation: Lost my job\nDistorted Thought: I'm a failure\nRational Response:"
        ));
    }

    #[test]
    fn generate_prompt_order_depends_on_rng() {
        let records: Vec<ExampleRecord> = (0..8).map(record).collect();
        let prompts: std::collections::HashSet<String> = (0..16)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                PromptAssembler::generate("t", "s", &records, &mut rng)
            })
            .collect();
        assert!(prompts.len() > 1);
    }

    #[test]
    fn rewrite_prompts_per_attribute() {
        assert_eq!(
            PromptAssembler::rewrite(ControlAttribute::Empathy, "R", "T", "S"),
            "Make the following reframed thought more empathic.\nAcknowledge feelings and provide emotional support.\n\nOriginal: R\nMore Empathic:"
        );
        assert_eq!(
            PromptAssembler::rewrite(ControlAttribute::Actionability, "R", "T", "S"),
            "Add specific actionable steps to the following reframed thought.\n\nOriginal: R\nMore Actionable:"
        );
        assert_eq!(
            PromptAssembler::rewrite(ControlAttribute::Specificity, "R", "T", "S"),
            "Make the following reframed thought more specific to the situation.\n\nSituation: S\nThought: T\nReframe: R\n\nMore Specific:"
        );
    }
}
