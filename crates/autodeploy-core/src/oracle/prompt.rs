//! Prompt rendering for the two oracle questions.

use repo_evidence::select::MAX_TREE_PATHS_FOR_PROMPT;
use repo_evidence::EvidenceCorpus;

use super::{PromptContext, PromptPurpose};

const OPEN_BRACE_STANDIN: char = '\u{FE5B}';
const CLOSE_BRACE_STANDIN: char = '\u{FE5C}';

const SYSTEM_PROMPT: &str = "You are a senior build and deployment engineer. \
You read repository evidence and answer strictly in the requested JSON shape, \
with no commentary.";

const REPORT_SHAPE: &str = r#"{
  "language": "python|node|go|ruby|java|rust|unknown",
  "language_version": "string or null",
  "frameworks": ["string"],
  "package_manager": "string or null",
  "dependencies": [{"name": "string", "version": "string or null", "source": "file it came from"}],
  "dev_dependencies": [{"name": "string", "version": "string or null", "source": "file it came from"}],
  "env_vars": [{"name": "string", "required": true, "default": "string or null", "description": "string"}],
  "start_commands": ["string"],
  "ports": [8000],
  "notes": ["string"]
}"#;

/// Replace braces in evidence with look-alike characters so snippets cannot
/// be mistaken for the JSON the oracle is asked to produce.
pub fn protect_braces(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '{' => OPEN_BRACE_STANDIN,
            '}' => CLOSE_BRACE_STANDIN,
            other => other,
        })
        .collect()
}

/// Corpus files as `### <path>` fenced blocks, in corpus order.
pub fn render_evidence(corpus: &EvidenceCorpus) -> String {
    let mut out = String::new();
    for file in corpus.iter() {
        out.push_str("### ");
        out.push_str(file.path());
        out.push_str("\n```\n");
        out.push_str(&protect_braces(file.content()));
        if !file.content().ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
    }
    out
}

/// Ask which files best reveal how the repository is built and run.
pub fn path_selection_prompt(repo_url: &str, tree: &[String], max_files: usize) -> PromptContext {
    let listed = tree.len().min(MAX_TREE_PATHS_FOR_PROMPT);
    let mut user = format!(
        "Repository: {}\nFile tree ({} of {} paths):\n",
        repo_url,
        listed,
        tree.len()
    );
    for path in tree.iter().take(listed) {
        user.push_str(path);
        user.push('\n');
    }
    user.push_str(&format!(
        "\nReturn ONLY a JSON array of at most {} paths from the list above, \
most informative first: dependency manifests, lockfiles, container \
descriptors, Procfile, entrypoints, and config or env examples.",
        max_files
    ));

    PromptContext {
        purpose: PromptPurpose::PathSelection,
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Ask for the environment report, given the assembled evidence.
pub fn environment_report_prompt(repo_url: &str, corpus: &EvidenceCorpus) -> PromptContext {
    let user = format!(
        "Repository: {}\n\nEvidence:\n\n{}\
Infer how this application is installed and started. Only list environment \
variables the evidence actually references. Return ONLY one JSON object of \
exactly this shape:\n{}\n",
        repo_url,
        render_evidence(corpus),
        REPORT_SHAPE
    );
    PromptContext {
        purpose: PromptPurpose::EnvironmentReport,
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::first_json_object;
    use repo_evidence::fakes::MemorySource;
    use repo_evidence::{CorpusAssembler, CorpusBudget};

    #[test]
    fn braces_are_replaced() {
        assert_eq!(protect_braces("a{b}c"), "a\u{FE5B}b\u{FE5C}c");
    }

    #[tokio::test]
    async fn evidence_cannot_masquerade_as_the_answer() {
        let source = MemorySource::new().with_file("config.json", "{\"language\": \"cobol\"}");
        let corpus = CorpusAssembler::new(CorpusBudget::default())
            .assemble(&source, &["config.json".to_string()])
            .await;
        let rendered = render_evidence(&corpus);
        assert!(rendered.starts_with("### config.json\n```\n"));
        assert!(first_json_object(&rendered).is_none());

        let prompt = environment_report_prompt("https://github.com/a/b", &corpus);
        assert_eq!(prompt.purpose, PromptPurpose::EnvironmentReport);
        // The only parseable object is the requested shape itself.
        let shape = first_json_object(&prompt.user).unwrap();
        assert_eq!(shape["language"], "python|node|go|ruby|java|rust|unknown");
    }

    #[test]
    fn tree_listing_is_capped() {
        let tree: Vec<String> = (0..MAX_TREE_PATHS_FOR_PROMPT + 10)
            .map(|i| format!("f{}.txt", i))
            .collect();
        let prompt = path_selection_prompt("u", &tree, 16);
        assert!(prompt.user.contains(&format!(
            "({} of {} paths)",
            MAX_TREE_PATHS_FOR_PROMPT,
            tree.len()
        )));
        assert!(!prompt.user.contains(&format!("f{}.txt\n", MAX_TREE_PATHS_FOR_PROMPT)));
        assert!(prompt.user.contains("at most 16 paths"));
    }
}
