//! Prompt Builder System
//!
//! Standardized prompt construction for book analysis calls.
//!
//! ## Layout
//!
//! 1. **Role**: literary analyst persona for the analysis type
//! 2. **Objectives**: numbered goals, extended for detailed depth
//! 3. **Context**: audience and book details
//! 4. **Focus**: keep the model on the supplied passage
//! 5. **Text**: the passage itself

use crate::types::{AnalysisDepth, AnalysisOptions, AnalysisType};

/// Instruction appended to every system prompt; parsed back by the analyzer
pub const CONFIDENCE_INSTRUCTION: &str = "End your answer with a final line of the form \
     `Confidence: <number between 0 and 1>` rating how well the passage supports your analysis.";

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Ordered key-value pairs
    Context(Vec<(String, String)>),
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Focus enforcement with restrictions
    Focus {
        target: String,
        restrictions: Vec<String>,
    },
    Custom(String),
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role definition section
    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    /// Add objectives section
    pub fn objectives<I, S>(mut self, objectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Add a context item, appending to the existing context section if any
    pub fn context_item(mut self, key: &str, value: &str) -> Self {
        let item = (key.to_string(), value.to_string());
        let existing = self.sections.iter_mut().find_map(|s| match s {
            PromptSection::Context(items) => Some(items),
            _ => None,
        });
        match existing {
            Some(items) => items.push(item),
            None => self.sections.push(PromptSection::Context(vec![item])),
        }
        self
    }

    /// Add text section
    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    /// Add text section with header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    /// Add focus enforcement section
    pub fn focus(mut self, target: &str, restrictions: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Focus {
            target: target.to_string(),
            restrictions: restrictions.into_iter().map(String::from).collect(),
        });
        self
    }

    pub fn custom(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Custom(content.to_string()));
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Context(items) => {
                    prompt.push_str("# Context\n\n");
                    for (key, value) in items {
                        prompt.push_str(&format!("**{}**: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Focus {
                    target,
                    restrictions,
                } => {
                    prompt.push_str("<FOCUS>\n");
                    prompt.push_str(&format!("IMPORTANT: Focus EXCLUSIVELY on: {}\n", target));
                    for restriction in restrictions {
                        prompt.push_str(&format!("- {}\n", restriction));
                    }
                    prompt.push_str("</FOCUS>\n\n");
                }
                PromptSection::Custom(content) => {
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

// =============================================================================
// Analysis Prompts
// =============================================================================

/// System and user messages for one analysis call
#[derive(Debug, Clone)]
pub struct AnalysisPrompt {
    pub system: String,
    pub user: String,
}

fn task_for(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Summary => "summarizing fiction and non-fiction",
        AnalysisType::Themes => "thematic analysis",
        AnalysisType::Characters => "character analysis",
        AnalysisType::Difficulty => "assessing reading difficulty",
        AnalysisType::Sentiment => "emotional tone and sentiment",
        AnalysisType::Style => "prose style and voice",
    }
}

fn objectives_for(analysis_type: AnalysisType, depth: AnalysisDepth) -> Vec<&'static str> {
    let (mut base, detailed) = match analysis_type {
        AnalysisType::Summary => (
            vec![
                "Summarize the plot and main ideas of the passage",
                "Keep events in the order they occur",
            ],
            "Cover secondary plot lines and turning points",
        ),
        AnalysisType::Themes => (
            vec![
                "Identify the central themes of the passage",
                "Explain how each theme is developed",
            ],
            "Trace the symbols and motifs that carry each theme",
        ),
        AnalysisType::Characters => (
            vec![
                "List the significant characters with a short description",
                "Describe their relationships and motivations",
            ],
            "Describe how each character changes over the passage",
        ),
        AnalysisType::Difficulty => (
            vec![
                "Rate the reading difficulty as beginner, intermediate or advanced",
                "Consider vocabulary, sentence structure and conceptual density",
            ],
            "Name the background knowledge a reader would benefit from",
        ),
        AnalysisType::Sentiment => (
            vec![
                "Describe the overall emotional tone of the passage",
                "Note where the mood shifts",
            ],
            "Tie each shift in mood to the events that cause it",
        ),
        AnalysisType::Style => (
            vec![
                "Describe the author's writing style",
                "Comment on voice, diction and sentence rhythm",
            ],
            "Relate the style to recognizable literary traditions",
        ),
    };
    if depth == AnalysisDepth::Detailed {
        base.push(detailed);
    }
    base
}

/// Build the prompt pair for analysing `content`
pub fn analysis_prompt(
    content: &str,
    analysis_type: AnalysisType,
    options: &AnalysisOptions,
) -> AnalysisPrompt {
    let system = PromptBuilder::new()
        .role("literary analyst", task_for(analysis_type))
        .focus(
            "the supplied passage",
            vec![
                "Do NOT rely on outside knowledge of the book",
                "Do NOT invent events or characters absent from the passage",
            ],
        )
        .custom(CONFIDENCE_INSTRUCTION)
        .build();

    let mut user = PromptBuilder::new().objectives(objectives_for(analysis_type, options.analysis_depth));
    if let Some(audience) = options.target_audience.as_deref().filter(|a| !a.trim().is_empty()) {
        user = user.context_item("Target audience", audience);
    }
    user = user.custom(if options.include_quotes {
        "Support each point with a short direct quotation from the passage."
    } else {
        "Paraphrase rather than quoting the passage."
    });

    AnalysisPrompt {
        system,
        user: user.section("Passage", content).build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_prompt() {
        let prompt = PromptBuilder::new()
            .role("literary analyst", "thematic analysis")
            .objectives(["Find themes", "Explain them"])
            .build();

        assert!(prompt.contains("<ROLE>"));
        assert!(prompt.contains("literary analyst"));
        assert!(prompt.contains("1. Find themes"));
        assert!(prompt.contains("2. Explain them"));
    }

    #[test]
    fn test_context_items_keep_order() {
        let prompt = PromptBuilder::new()
            .context_item("Title", "Moby-Dick")
            .context_item("Author", "Herman Melville")
            .build();

        let title = prompt.find("**Title**: Moby-Dick").unwrap();
        let author = prompt.find("**Author**: Herman Melville").unwrap();
        assert!(title < author);
        assert_eq!(prompt.matches("# Context").count(), 1);
    }

    #[test]
    fn test_analysis_prompt_depth_and_quotes() {
        let standard = analysis_prompt("Call me Ishmael.", AnalysisType::Themes, &AnalysisOptions::default());
        assert!(standard.system.contains("thematic analysis"));
        assert!(standard.system.contains("Confidence:"));
        assert!(!standard.user.contains("3. "));
        assert!(standard.user.contains("Paraphrase"));
        assert!(standard.user.ends_with("Call me Ishmael."));

        let options = AnalysisOptions {
            include_quotes: true,
            target_audience: Some("high school students".to_string()),
            ..AnalysisOptions::detailed()
        };
        let detailed = analysis_prompt("Call me Ishmael.", AnalysisType::Themes, &options);
        assert!(detailed.user.contains("3. Trace the symbols"));
        assert!(detailed.user.contains("direct quotation"));
        assert!(detailed.user.contains("**Target audience**: high school students"));
    }

    #[test]
    fn test_every_type_has_prompt() {
        for analysis_type in AnalysisType::ALL {
            let prompt = analysis_prompt("text", analysis_type, &AnalysisOptions::default());
            assert!(prompt.user.contains("<OBJECTIVES>"));
        }
    }
}
