mod helpers;

use augur::context::{ContextEntry, ContextWindow, Trend};
use chrono::{Duration as ChronoDuration, Utc};
use helpers::{context_config, result, result_at};
use std::time::Duration;

#[test]
fn add_and_lookup_entries() {
    let window = ContextWindow::new(context_config(10));
    let id = window.add_entry(&result("r1", "first", &[("joy", 0.8)]), ["diary", "diary", "work"]);

    assert_eq!(id, "r1");
    let entry = window.get_entry("r1").unwrap();
    assert_eq!(entry.weight, 1.0);
    assert_eq!(entry.tags, vec!["diary", "work"]);
    assert_eq!(window.entries_by_tag("work").len(), 1);
    assert!(window.entries_by_tag("other").is_empty());
    assert!(window.get_entry("missing").is_none());
}

#[test]
fn full_window_evicts_lowest_weight() {
    let window = ContextWindow::new(context_config(3));
    for id in ["a", "b", "c"] {
        window.add_entry(&result(id, id, &[("joy", 0.5)]), Vec::<String>::new());
    }
    window.apply_decay();
    window.boost_entry("a", 0.1);
    window.boost_entry("c", 0.1);

    window.add_entry(&result("d", "d", &[]), Vec::<String>::new());

    assert_eq!(window.len(), 3);
    assert!(window.get_entry("b").is_none());
    assert!(window.get_entry("d").is_some());
}

#[test]
fn re_adding_existing_id_does_not_evict() {
    let window = ContextWindow::new(context_config(2));
    window.add_entry(&result("a", "a", &[]), Vec::<String>::new());
    window.add_entry(&result("b", "b", &[]), Vec::<String>::new());
    window.add_entry(&result("a", "a again", &[]), Vec::<String>::new());

    assert_eq!(window.len(), 2);
    assert_eq!(window.get_entry("a").unwrap().text, "a again");
    assert!(window.get_entry("b").is_some());
}

#[test]
fn decay_drops_entries_below_min_weight() {
    let mut config = context_config(10);
    config.decay_rate = 0.5;
    config.min_weight = 0.2;
    let window = ContextWindow::new(config);
    window.add_entry(&result("a", "a", &[]), Vec::<String>::new());

    assert_eq!(window.apply_decay(), 0); // 0.5
    assert_eq!(window.apply_decay(), 0); // 0.25
    assert_eq!(window.apply_decay(), 1); // 0.125
    assert!(window.is_empty());
}

#[test]
fn boost_caps_at_one_and_ignores_negative() {
    let window = ContextWindow::new(context_config(10));
    window.add_entry(&result("a", "a", &[]), Vec::<String>::new());
    window.apply_decay();

    assert!(window.boost_entry("a", -0.5));
    assert!((window.get_entry("a").unwrap().weight - 0.9).abs() < 1e-9);

    assert!(window.boost_entry("a", 5.0));
    assert_eq!(window.get_entry("a").unwrap().weight, 1.0);
    assert!(!window.boost_entry("missing", 0.1));
}

#[test]
fn dominant_emotions_weighted_by_confidence() {
    let window = ContextWindow::new(context_config(10));
    window.add_entry(&result("a", "a", &[("joy", 0.9), ("fear", 0.3)]), Vec::<String>::new());
    window.add_entry(&result("b", "b", &[("fear", 0.4), ("anger", 0.2)]), Vec::<String>::new());

    assert_eq!(window.dominant_emotions(2), vec!["joy", "fear"]);
    assert_eq!(window.dominant_emotions(10).len(), 3);
}

#[test]
fn trends_follow_timestamp_order() {
    let window = ContextWindow::new(context_config(10));
    let base = Utc::now() - ChronoDuration::hours(1);
    let samples = [0.2, 0.2, 0.8, 0.8];
    // inserted newest first to show ordering is by timestamp
    for (i, confidence) in samples.iter().enumerate().rev() {
        let at = base + ChronoDuration::minutes(i as i64);
        window.add_entry(
            &result_at(&format!("e{i}"), "t", &[("joy", *confidence)], at),
            Vec::<String>::new(),
        );
    }

    let trends = window.emotion_trends();
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].emotion, "joy");
    assert_eq!(trends[0].trend, Trend::Increasing);
    assert_eq!(trends[0].values, vec![0.2, 0.2, 0.8, 0.8]);
    assert!((trends[0].average - 0.5).abs() < 1e-9);
}

#[test]
fn compare_and_find_similar() {
    let window = ContextWindow::new(context_config(10));
    window.add_entry(&result("a", "a", &[("joy", 0.9), ("sadness", 0.1)]), Vec::<String>::new());
    window.add_entry(&result("b", "b", &[("joy", 0.85), ("sadness", 0.1)]), Vec::<String>::new());
    window.add_entry(&result("c", "c", &[("anger", 0.9)]), Vec::<String>::new());

    let close = window.compare("a", "b").unwrap();
    assert!(close.similarity > 0.8);
    assert_eq!(close.shared_emotions, vec!["joy", "sadness"]);
    assert_eq!(
        close.narrative,
        "Very similar emotional profiles with 2 shared emotions."
    );

    let far = window.compare("a", "c").unwrap();
    assert!(far.similarity <= 0.5);
    assert!(far.shared_emotions.is_empty());
    assert!(far
        .narrative
        .starts_with("Significantly different emotional profiles."));

    assert!(window.compare("a", "missing").is_none());

    let similar: Vec<String> = window
        .find_similar("a", 0.8)
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    assert_eq!(similar, vec!["b"]);
    assert!(window.find_similar("missing", 0.0).is_empty());
}

#[test]
fn summary_reports_counts_and_timespan() {
    let window = ContextWindow::new(context_config(10));
    assert!(window.summary().timespan.is_none());

    let start = Utc::now() - ChronoDuration::minutes(10);
    let end = Utc::now();
    window.add_entry(&result_at("a", "a", &[("joy", 0.8)], end), ["work"]);
    window.add_entry(&result_at("b", "b", &[("joy", 0.6)], start), ["work", "home"]);

    let summary = window.summary();
    assert_eq!(summary.entry_count, 2);
    assert!((summary.total_weight - 2.0).abs() < 1e-9);
    assert_eq!(summary.dominant_emotions, vec!["joy"]);
    assert_eq!(summary.themes, vec!["work", "home"]);
    let timespan = summary.timespan.unwrap();
    assert_eq!(timespan.start, start);
    assert_eq!(timespan.end, end);
}

#[test]
fn export_import_skips_decayed_entries() {
    let source = ContextWindow::new(context_config(10));
    source.add_entry(&result("a", "a", &[("joy", 0.7)]), ["x"]);
    source.add_entry(&result("b", "b", &[]), Vec::<String>::new());

    let mut exported = source.export();
    exported.push(ContextEntry::new(
        "faded".into(),
        "old".into(),
        Vec::new(),
        Utc::now(),
        0.001,
        Vec::new(),
    ));

    let json = serde_json::to_string(&exported).unwrap();
    let target = ContextWindow::new(context_config(10));
    target.import(serde_json::from_str(&json).unwrap());

    let ids: Vec<String> = target.all_entries().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(target.get_entry("a").unwrap().tags, vec!["x"]);
}

#[test]
fn import_trims_to_capacity() {
    let source = ContextWindow::new(context_config(10));
    for id in ["a", "b", "c", "d"] {
        source.add_entry(&result(id, id, &[]), Vec::<String>::new());
    }
    source.apply_decay();
    source.boost_entry("c", 0.1);
    source.boost_entry("d", 0.1);

    let target = ContextWindow::new(context_config(2));
    target.import(source.export());

    let mut ids: Vec<String> = target.all_entries().into_iter().map(|e| e.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["c", "d"]);
}

#[test]
fn no_runtime_means_no_background_decay() {
    let mut config = context_config(10);
    config.auto_decay = true;
    let window = ContextWindow::new(config);
    assert!(!window.is_decaying());
    window.dispose();
}

#[tokio::test]
async fn background_decay_runs_on_interval() {
    let mut config = context_config(10);
    config.auto_decay = true;
    config.decay_interval_ms = 10;
    let window = ContextWindow::new(config);
    assert!(window.is_decaying());

    window.add_entry(&result("a", "a", &[]), Vec::<String>::new());
    tokio::time::sleep(Duration::from_millis(60)).await;

    let weight = window.get_entry("a").unwrap().weight;
    assert!(weight < 1.0, "background decay should have lowered weight, got {weight}");
    window.dispose();
}

#[tokio::test]
async fn stopped_decay_task_never_fires() {
    let mut config = context_config(10);
    config.auto_decay = true;
    config.decay_interval_ms = 10;
    let window = ContextWindow::new(config);
    window.add_entry(&result("a", "a", &[]), Vec::<String>::new());

    window.stop_decay_task();
    window.stop_decay_task();
    assert!(!window.is_decaying());

    let before = window.get_entry("a").unwrap().weight;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(window.get_entry("a").unwrap().weight, before);

    assert!(window.start_decay_task());
    window.dispose();
    window.dispose();
    assert!(window.is_empty());
    assert!(!window.is_decaying());
}
