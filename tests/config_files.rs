// The shipped sample configuration must always load.

use std::path::Path;

use prepper_alerts::config::{AppConfig, RunOptions};

fn shipped() -> AppConfig {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    AppConfig::load_dir(&dir).expect("sample config is valid")
}

#[test]
fn sample_config_validates() {
    let cfg = shipped();
    let ids: Vec<&str> = cfg.locations.locations.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["home", "cabin"]);
    assert!(cfg.settings.news_stack.require_hazard);
    assert!(cfg.settings.global.safety.allowlist_domains.iter().any(|d| d == "wtop.com"));
}

#[test]
fn cabin_override_lowers_normal_quake_floor() {
    let cfg = shipped();
    assert_eq!(cfg.quake_thresholds("cabin"), (2.5, 5.0));
    assert_eq!(cfg.quake_thresholds("home"), (3.0, 5.0));
}

#[test]
fn keywords_come_from_file_not_label() {
    let cfg = shipped();
    let cabin = cfg.locations.get("cabin").unwrap();
    let kw = cfg.keywords_for(cabin);
    assert_eq!(kw.metadata.county, "Rockingham County");
    assert!(kw.locality_tokens().contains(&"i-81".to_string()));
}

#[test]
fn classifier_ships_disabled() {
    let cfg = shipped();
    let opts = RunOptions::from_settings(&cfg.settings, false);
    assert!(!opts.classifier.enabled);
    assert!(!opts.dry_run);
    let params = cfg.signal_params();
    assert_eq!(params.require_domains, 2);
    assert_eq!(params.hysteria_sources, 2);
}
