//! Budget and determinism properties of corpus assembly.

use repo_evidence::fakes::MemorySource;
use repo_evidence::{
    prioritize_candidates, CorpusAssembler, CorpusBudget, CorpusOutcome, EvidenceSource,
};

fn sample_source() -> MemorySource {
    MemorySource::new()
        .with_file("README.md", "# Demo\nRun with `gunicorn app:app`.\n")
        .with_file("requirements.txt", "flask==3.0.0\ngunicorn\n")
        .with_file("app.py", "import os\nPORT = os.getenv('PORT', '8000')\n")
        .with_file("poetry.lock", "x".repeat(4_000))
        .with_file("docs/guide.md", "deep docs")
}

#[tokio::test]
async fn used_bytes_never_exceeds_cap_for_any_budget() {
    let source = sample_source();
    let tree = source.fetch_tree().await.unwrap();
    let candidates = prioritize_candidates(&tree, &[], 16);

    for total in [0usize, 1, 7, 33, 64, 100, 1_000, 10_000] {
        for per_file in [1usize, 10, 500, 100_000] {
            let assembler = CorpusAssembler::new(CorpusBudget {
                max_files: 16,
                per_file_bytes: per_file,
                total_bytes: total,
            });
            let corpus = assembler.assemble(&source, &candidates).await;
            assert!(
                corpus.used_bytes() <= corpus.budget_cap(),
                "total={} per_file={} used={}",
                total,
                per_file,
                corpus.used_bytes()
            );
            let summed: usize = corpus.iter().map(|f| f.byte_size()).sum();
            assert_eq!(summed, corpus.used_bytes());
        }
    }
}

#[tokio::test]
async fn identical_inputs_give_identical_corpus() {
    let candidates: Vec<String> = ["README.md", "requirements.txt", "poetry.lock", "app.py"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let assembler = CorpusAssembler::new(CorpusBudget {
        max_files: 16,
        per_file_bytes: 100_000,
        total_bytes: 500,
    });

    let first = assembler.assemble(&sample_source(), &candidates).await;
    let second = assembler.assemble(&sample_source(), &candidates).await;

    assert_eq!(first, second);
    assert_eq!(first.digest(), second.digest());
    assert!(matches!(
        first.outcome(),
        CorpusOutcome::BudgetExhausted { truncated_path: Some(p), .. } if p == "poetry.lock"
    ));
    // app.py comes after the truncated lockfile and is never added.
    assert!(first.get("app.py").is_none());
}

#[tokio::test]
async fn readme_is_included_whole_before_truncation() {
    let source = sample_source();
    let tree = source.fetch_tree().await.unwrap();
    let picks = vec!["requirements.txt".to_string(), "poetry.lock".to_string()];
    let candidates = prioritize_candidates(&tree, &picks, 16);
    assert_eq!(candidates[0], "README.md");

    let corpus = CorpusAssembler::new(CorpusBudget {
        max_files: 16,
        per_file_bytes: 100_000,
        total_bytes: 120,
    })
    .assemble(&source, &candidates)
    .await;

    let readme = corpus.get("README.md").unwrap();
    assert!(!readme.is_truncated());
    assert!(corpus.get("poetry.lock").unwrap().is_truncated());
    assert_eq!(corpus.used_bytes(), 120);
}
