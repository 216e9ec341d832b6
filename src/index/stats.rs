use crate::index::loader::LoadOutcome;
use std::path::PathBuf;

/// Display statistics for a loaded index
pub fn show_stats(outcome: &LoadOutcome, dirs: &[PathBuf]) {
    let index = &outcome.index;
    let report = &outcome.report;

    println!("Index Statistics");
    println!("================");
    println!();
    for dir in dirs {
        println!("Search dir:       {}", dir.display());
    }
    println!("Shards loaded:    {}", report.loaded);
    println!("Shards failed:    {}", report.failures.len());
    println!("Duplicate names:  {}", report.duplicates.len());
    println!("Distinct tokens:  {}", index.len());
    println!("References:       {}", index.reference_count());

    let size: u64 = index
        .shards()
        .filter_map(|s| s.source.as_ref())
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();
    println!("Shard size:       {}", format_size(size));

    println!();
    println!("References by section:");
    let mut sorted: Vec<_> = index.section_counts().into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (section, count) in sorted {
        println!("  {:15} {}", section.as_str(), count);
    }

    let mut largest: Vec<_> = index.shards().collect();
    largest.sort_by(|a, b| b.references.cmp(&a.references).then(a.name.raw.cmp(&b.name.raw)));
    println!();
    println!("Largest shards:");
    for info in largest.iter().take(10) {
        println!("  {:20} {:>6} entries {:>6} references", info.name.raw, info.entries, info.references);
    }
    if largest.len() > 10 {
        println!("  ... and {} more", largest.len() - 10);
    }
}

/// Print every failure and duplicate; returns true when all shards loaded
pub fn check(outcome: &LoadOutcome) -> bool {
    let report = &outcome.report;

    for failure in &report.failures {
        println!("error: {}", failure);
    }
    for dup in &report.duplicates {
        let note = match dup.identical {
            Some(true) => "identical",
            Some(false) => "different content",
            None => "not compared",
        };
        println!(
            "duplicate: {} ({}) {} replaced by {}",
            dup.name, note, dup.replaced, dup.replacement
        );
    }

    println!(
        "{} shards ok, {} failed, {} duplicate names",
        report.loaded,
        report.failures.len(),
        report.duplicates.len()
    );
    report.is_clean()
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::loader::IndexLoader;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_check_reports_failures() {
        let mut loader = IndexLoader::new();
        loader
            .add_payload("all_0", "var searchData=[['a_1',['a',['a.html',1,'']]]];")
            .add_payload("all_1", "var searchData=[['b_1',['b',[]]]];");
        let outcome = loader.load().unwrap();
        assert!(!check(&outcome));
    }
}
