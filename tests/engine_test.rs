//! End-to-end pipeline tests over synthetic repositories.

use git2::Repository;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

use gitally::{RepoAnalyzer, Settings};

const DAY: i64 = 86_400;

fn commit_at(repo: &Repository, name: &str, email: &str, message: &str, time: i64) -> String {
    let when = git2::Time::new(time, 0);
    let sig = git2::Signature::new(name, email, &when).unwrap();
    let tree_id = {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        index.write_tree().unwrap()
    };
    let tree = repo.find_tree(tree_id).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
        .to_string()
}

fn settings_for(paths: &[&Path]) -> Settings {
    let mut settings = Settings::default();
    settings.repositories = paths.iter().map(|p| p.to_path_buf()).collect();
    settings
}

#[test]
fn rename_preserves_authorship_end_to_end() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("old.py"), "a = 1\nb = 2\nc = 3\n").unwrap();
    commit_at(&repo, "Alice", "alice@example.com", "add old.py", 1_000_000);
    fs::rename(dir.path().join("old.py"), dir.path().join("new.py")).unwrap();
    commit_at(&repo, "Bob", "bob@example.com", "rename", 1_000_000 + DAY);

    let analyzer = RepoAnalyzer::new(settings_for(&[dir.path()])).unwrap();
    let result = analyzer.run(dir.path()).unwrap();

    let alice = result
        .tables
        .authors
        .iter()
        .find(|a| a.name == "Alice")
        .unwrap();
    assert_eq!(alice.lines, 3);
    assert_eq!(alice.lines_percent, Some(100.0));
    // Bob renamed but authored nothing that survives.
    let bob = result.tables.authors.iter().find(|a| a.name == "Bob");
    assert!(bob.is_none() || bob.unwrap().lines == 0);

    let attributed = result.files.iter().find(|f| f.path == "new.py").unwrap();
    assert!(!attributed.lineage.is_empty());
    assert_eq!(attributed.lineage[0].prior.as_ref().unwrap().path, "old.py");

    // The live path owns all surviving lines; the pre-rename path keeps
    // only its insertion history.
    let new = result.tables.files.iter().find(|f| f.path == "new.py").unwrap();
    assert_eq!(new.lines, 3);
    if let Some(old) = result.tables.files.iter().find(|f| f.path == "old.py") {
        assert_eq!(old.lines, 0);
    }
}

#[test]
fn aliases_merge_into_one_author() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("a.py"), "one = 1\n").unwrap();
    commit_at(
        &repo,
        "Alice Adams",
        "alice@example.com",
        "one",
        1_000_000,
    );
    fs::write(dir.path().join("a.py"), "one = 1\ntwo = 2\n").unwrap();
    // Shares the email with pair one, bridging the names.
    commit_at(&repo, "alice", "alice@example.com", "two", 1_000_000 + DAY);
    fs::write(dir.path().join("a.py"), "one = 1\ntwo = 2\nthree = 3\n").unwrap();
    // Shares the name with pair two, transitively the same person.
    commit_at(&repo, "alice", "aadams@work.example", "three", 1_000_000 + 2 * DAY);

    let analyzer = RepoAnalyzer::new(settings_for(&[dir.path()])).unwrap();
    let result = analyzer.run(dir.path()).unwrap();

    assert_eq!(result.tables.authors.len(), 1);
    let row = &result.tables.authors[0];
    assert_eq!(row.name, "Alice Adams");
    assert_eq!(row.lines, 3);
    assert_eq!(row.commits, 3);
    assert_eq!(row.lines_percent, Some(100.0));

    let person = &result.persons[0];
    assert_eq!(person.emails.len(), 2);
    assert_eq!(person.names.len(), 2);
}

#[test]
fn excluded_authors_leave_denominators() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("a.py"), "human = 1\n").unwrap();
    commit_at(&repo, "Alice", "alice@example.com", "human line", 1_000_000);
    fs::write(dir.path().join("a.py"), "human = 1\nbot = 2\nbot2 = 3\n").unwrap();
    commit_at(
        &repo,
        "deploy-bot",
        "bot@ci.example",
        "bot lines",
        1_000_000 + DAY,
    );

    let mut settings = settings_for(&[dir.path()]);
    settings.ex_authors = vec!["*bot*".to_string()];
    let analyzer = RepoAnalyzer::new(settings).unwrap();
    let result = analyzer.run(dir.path()).unwrap();

    assert_eq!(result.tables.included_authors, 1);
    assert_eq!(result.tables.total_lines, 1);
    let bot = result.tables.authors.iter().find(|a| a.excluded).unwrap();
    assert_eq!(bot.lines, 2);
    assert_eq!(bot.lines_percent, None);
    let alice = result.tables.authors.iter().find(|a| !a.excluded).unwrap();
    assert_eq!(alice.lines_percent, Some(100.0));
    assert_eq!(alice.scaled_percent, Some(100.0));
}

#[test]
fn rowless_author_does_not_dilute_scaled_percent() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
    commit_at(&repo, "Alice", "alice@example.com", "add", 1_000_000);
    // Chore's only commit is message-excluded and its line is gone by
    // HEAD, so Chore is registered but never earns a table row.
    fs::write(dir.path().join("a.py"), "formatted = 1\n").unwrap();
    commit_at(
        &repo,
        "Chore",
        "chore@ci.example",
        "auto-format pass",
        1_000_000 + DAY,
    );
    fs::write(dir.path().join("a.py"), "x = 1\ny = 2\n").unwrap();
    commit_at(&repo, "Alice", "alice@example.com", "rewrite", 1_000_000 + 2 * DAY);

    let mut settings = settings_for(&[dir.path()]);
    settings.ex_messages = vec!["auto-format*".to_string()];
    let analyzer = RepoAnalyzer::new(settings).unwrap();
    let result = analyzer.run(dir.path()).unwrap();

    assert!(result.tables.authors.iter().all(|a| a.name != "Chore"));
    assert_eq!(result.tables.included_authors, 1);
    let alice = result
        .tables
        .authors
        .iter()
        .find(|a| a.name == "Alice")
        .unwrap();
    assert_eq!(alice.lines_percent, Some(100.0));
    assert_eq!(alice.scaled_percent, Some(100.0));
}

#[test]
fn ignore_revs_marks_lines_excluded() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
    commit_at(&repo, "Alice", "alice@example.com", "add", 1_000_000);
    fs::write(dir.path().join("a.py"), "x = 1\nreformatted = 2\n").unwrap();
    let reformat = commit_at(
        &repo,
        "Bob",
        "bob@example.com",
        "reformat",
        1_000_000 + DAY,
    );

    let revs = dir.path().join("ignore-revs.txt");
    fs::write(&revs, format!("# reformat commits\n{reformat}\n")).unwrap();

    let mut settings = settings_for(&[dir.path()]);
    settings.ignore_revs_file = Some(revs);
    let analyzer = RepoAnalyzer::new(settings).unwrap();
    let result = analyzer.run(dir.path()).unwrap();

    // Bob's line blames to the ignored commit and is not counted.
    assert_eq!(result.tables.total_lines, 1);
    assert!(result.tables.authors.iter().all(|a| a.name != "Bob" || a.lines == 0));
}

#[test]
fn date_range_limits_commits() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
    commit_at(&repo, "Alice", "alice@example.com", "early", 1_000_000);
    fs::write(dir.path().join("a.py"), "x = 1\ny = 2\n").unwrap();
    commit_at(
        &repo,
        "Bob",
        "bob@example.com",
        "late",
        1_000_000 + 100 * DAY,
    );

    let mut settings = settings_for(&[dir.path()]);
    settings.since = Some(
        chrono::DateTime::from_timestamp(1_000_000 + 50 * DAY, 0).unwrap(),
    );
    let analyzer = RepoAnalyzer::new(settings).unwrap();
    let result = analyzer.run(dir.path()).unwrap();

    assert_eq!(result.commits_seen, 1);
    let bob = result.tables.authors.iter().find(|a| a.name == "Bob").unwrap();
    assert_eq!(bob.insertions, 1);
}

#[test]
fn mean_line_age_is_anchored_at_head() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
    commit_at(&repo, "Alice", "alice@example.com", "old line", 1_000_000);
    fs::write(dir.path().join("a.py"), "x = 1\ny = 2\n").unwrap();
    commit_at(
        &repo,
        "Bob",
        "bob@example.com",
        "new line",
        1_000_000 + 40 * DAY,
    );

    let analyzer = RepoAnalyzer::new(settings_for(&[dir.path()])).unwrap();
    let result = analyzer.run(dir.path()).unwrap();

    let alice = result
        .tables
        .authors
        .iter()
        .find(|a| a.name == "Alice")
        .unwrap();
    // 40 days is one mean month and a remainder.
    let age = alice.age.unwrap();
    assert_eq!(age.years, 0);
    assert_eq!(age.months, 1);
    let bob = result.tables.authors.iter().find(|a| a.name == "Bob").unwrap();
    assert_eq!(bob.age.unwrap().days, 0);
    assert_eq!(bob.age.unwrap().months, 0);
}

#[test]
fn batch_accounts_for_every_repository() {
    let good1 = tempdir().unwrap();
    let repo1 = Repository::init(good1.path()).unwrap();
    fs::write(good1.path().join("a.py"), "x = 1\n").unwrap();
    commit_at(&repo1, "Alice", "alice@example.com", "a", 1_000_000);

    let good2 = tempdir().unwrap();
    let repo2 = Repository::init(good2.path()).unwrap();
    fs::write(good2.path().join("b.py"), "y = 1\n").unwrap();
    commit_at(&repo2, "Bob", "bob@example.com", "b", 1_000_000);

    let bad = tempdir().unwrap();

    let analyzer =
        RepoAnalyzer::new(settings_for(&[good1.path(), bad.path(), good2.path()])).unwrap();
    let batch = analyzer.run_batch().unwrap();

    assert_eq!(batch.results.len(), 2);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(
        batch.results.len() + batch.failures.len(),
        3,
        "every repository must be accounted for"
    );
}

#[test]
fn percentages_are_stable_across_runs() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("a.py"), "a = 1\nb = 2\n").unwrap();
    commit_at(&repo, "Alice", "alice@example.com", "a", 1_000_000);
    fs::write(dir.path().join("a.py"), "a = 1\nb = 2\nc = 3\nd = 4\n").unwrap();
    commit_at(&repo, "Bob", "bob@example.com", "b", 1_000_000 + DAY);

    let analyzer = RepoAnalyzer::new(settings_for(&[dir.path()])).unwrap();
    let first = analyzer.run(dir.path()).unwrap();
    let second = analyzer.run(dir.path()).unwrap();

    let summarize = |r: &gitally::pipeline::RepoResult| {
        r.tables
            .authors
            .iter()
            .map(|a| (a.name.clone(), a.lines, a.lines_percent))
            .collect::<Vec<_>>()
    };
    assert_eq!(summarize(&first), summarize(&second));

    let sum: f64 = first
        .tables
        .authors
        .iter()
        .filter_map(|a| a.lines_percent)
        .sum();
    assert!((sum - 100.0).abs() < 1e-9);
    assert_eq!(first.tables.authors[0].lines_percent, Some(50.0));
    assert_eq!(first.tables.authors[0].scaled_percent, Some(100.0));
}
