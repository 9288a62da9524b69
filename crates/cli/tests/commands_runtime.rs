use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

use cartwright_cli::commands::quote::QuoteArgs;
use cartwright_cli::commands::{check_coupons, config, quote};
use cartwright_core::config::{AppConfig, LoadOptions};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;

const CART: &str = r#"{
  "lines": [
    { "sku": "A", "quantity": 2, "unit_price": "300" },
    { "sku": "B", "quantity": 1, "unit_price": "150" }
  ]
}"#;

const NOW: &str = "2026-10-18T12:00:00Z";

#[test]
fn quote_reports_totals_and_fingerprint() {
    let fixtures = Fixtures::new();
    let args = fixtures.quote_args(
        r#"[{ "code": "twenty", "kind": { "type": "percent_all", "percent": "20" } }]"#,
    );

    let result = quote::run(args.clone(), &AppConfig::default());
    assert_eq!(result.exit_code, 0, "expected successful quote: {}", result.output);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "quote");
    assert_eq!(payload["status"], "ok");
    assert_eq!(decimal(&payload["quote"]["subtotal"]), Decimal::new(750, 0));
    assert_eq!(decimal(&payload["quote"]["total_discount"]), Decimal::new(150, 0));
    assert_eq!(decimal(&payload["quote"]["total"]), Decimal::new(600, 0));
    assert_eq!(payload["quote"]["currency"], "USD");
    assert_eq!(payload["quote"]["applications"][0]["code"], "TWENTY");
    assert_eq!(payload["quote"]["applications"][0]["outcome"]["status"], "applied");

    let again = parse_payload(&quote::run(args, &AppConfig::default()).output);
    assert_eq!(payload["fingerprint"], again["fingerprint"]);
    assert_eq!(payload["fingerprint"].as_str().map(str::len), Some(64));
}

#[test]
fn quote_rejects_coupon_when_usage_limit_is_reached() {
    let fixtures = Fixtures::new();
    let mut args = fixtures.quote_args(
        r#"[{ "code": "LAST", "kind": { "type": "fixed", "amount": "25" }, "usage_limit": 1 }]"#,
    );
    let usage = r#"{ "LAST": { "global": 1, "for_user": 0 } }"#;
    args.usage = Some(fixtures.write("usage.json", usage));

    let result = quote::run(args, &AppConfig::default());
    assert_eq!(result.exit_code, 0, "a rejected coupon does not fail the quote");

    let payload = parse_payload(&result.output);
    let outcome = &payload["quote"]["applications"][0]["outcome"];
    assert_eq!(outcome["status"], "not_applicable");
    assert_eq!(outcome["reason"]["reason"], "usage_limit_reached");
    assert_eq!(decimal(&payload["quote"]["total_discount"]), Decimal::ZERO);
}

#[test]
fn quote_with_order_id_commits_redemptions() {
    let fixtures = Fixtures::new();
    let mut args = fixtures.quote_args(
        r#"[
          { "code": "TEN", "kind": { "type": "percent_all", "percent": "10" }, "stackable": true },
          { "code": "FIVE", "kind": { "type": "fixed", "amount": "5" }, "stackable": true,
            "description": "Five off" }
        ]"#,
    );
    args.user = Some("alice".to_string());
    args.order_id = Some("ORD-1".to_string());

    let result = quote::run(args, &AppConfig::default());
    assert_eq!(result.exit_code, 0, "expected successful finalize: {}", result.output);

    let payload = parse_payload(&result.output);
    let applied = payload["order"]["applied_coupons"].as_array().cloned().unwrap_or_default();
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[1]["description"], "Five off");
    assert_eq!(decimal(&payload["order"]["quote"]["total_discount"]), Decimal::new(80, 0));

    let committed = payload["audit"]
        .as_array()
        .map(|events| {
            events.iter().filter(|event| event["event_type"] == "redemption.committed").count()
        })
        .unwrap_or_default();
    assert_eq!(committed, 2);
}

#[test]
fn quote_deactivates_expired_coupons() {
    let fixtures = Fixtures::new();
    let args = fixtures.quote_args(
        r#"[{ "code": "OLD", "kind": { "type": "fixed", "amount": "5" },
              "ends_at": "2026-01-01T00:00:00Z" }]"#,
    );

    let payload = parse_payload(&quote::run(args, &AppConfig::default()).output);
    assert_eq!(payload["deactivated"][0], "OLD");
    assert_eq!(payload["quote"]["applications"][0]["outcome"]["reason"]["reason"], "inactive");
}

#[test]
fn quote_auto_apply_only_uses_flagged_coupons() {
    let fixtures = Fixtures::new();
    let mut args = fixtures.quote_args(
        r#"[
          { "code": "MANUAL", "kind": { "type": "fixed", "amount": "5" } },
          { "code": "AUTO", "kind": { "type": "fixed", "amount": "7" }, "auto_apply": true }
        ]"#,
    );
    args.auto_apply = true;

    let payload = parse_payload(&quote::run(args, &AppConfig::default()).output);
    let applications = payload["quote"]["applications"].as_array().cloned().unwrap_or_default();
    assert_eq!(applications.len(), 1);
    assert_eq!(applications[0]["code"], "AUTO");
    assert_eq!(decimal(&payload["quote"]["total_discount"]), Decimal::new(7, 0));
}

#[test]
fn quote_returns_argument_failure_for_bad_timestamp() {
    let fixtures = Fixtures::new();
    let mut args = fixtures.quote_args("[]");
    args.now = Some("yesterday".to_string());

    let result = quote::run(args, &AppConfig::default());
    assert_eq!(result.exit_code, 3);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["error_class"], "invalid_argument");
}

#[test]
fn quote_returns_parse_failure_for_missing_cart() {
    let fixtures = Fixtures::new();
    let mut args = fixtures.quote_args("[]");
    args.cart = fixtures.dir.path().join("missing.json");

    let result = quote::run(args, &AppConfig::default());
    assert_eq!(result.exit_code, 3);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "quote");
    assert_eq!(payload["error_class"], "cart_parse");
}

#[test]
fn check_coupons_reports_each_invalid_draft() {
    let fixtures = Fixtures::new();
    let path = fixtures.write(
        "drafts.json",
        r#"[
          { "code": " save10 ", "discount_type": "percent_all", "discount_value": "10" },
          { "code": "SAVE10", "discount_type": "fixed", "discount_value": "5" },
          { "code": "HUGE", "discount_type": "percent_specific", "discount_value": "150" },
          { "code": "B2G1", "discount_type": "bogo", "bogo_buy_quantity": 2 }
        ]"#,
    );

    let result = check_coupons::run(&path);
    assert_eq!(result.exit_code, 4, "invalid drafts should fail the check");

    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["valid"], 2);
    assert_eq!(payload["invalid"], 2);
    assert_eq!(payload["coupons"][0]["code"], "SAVE10");
    assert_eq!(payload["coupons"][1]["code"], "SAVE10");
    assert_eq!(payload["coupons"][1]["status"], "invalid");
    assert_eq!(payload["coupons"][2]["status"], "invalid");
    assert_eq!(payload["coupons"][3]["discount_type"], "bogo");
}

#[test]
fn check_coupons_lists_auto_apply_candidates() {
    let fixtures = Fixtures::new();
    let path = fixtures.write(
        "drafts.json",
        r#"[
          { "code": "WELCOME", "discount_value": "5", "auto_apply": true },
          { "code": "MANUAL", "discount_type": "fixed", "discount_value": "3" }
        ]"#,
    );

    let result = check_coupons::run(&path);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["auto_apply"], serde_json::json!(["WELCOME"]));
}

#[test]
fn config_reports_env_source() {
    with_env(&[("CARTWRIGHT_ENGINE_CURRENCY", "EUR")], || {
        let config = AppConfig::load(LoadOptions::default()).expect("config should load");
        let output = config::run(&config);

        let currency_line = "engine.currency = EUR (source: env (CARTWRIGHT_ENGINE_CURRENCY))";
        assert!(output.contains(currency_line));
        assert!(output.contains("engine.minor_unit_scale = 2 (source: default)"));
        assert!(output.contains("logging.level = info (source: default)"));
    });
}

struct Fixtures {
    dir: TempDir,
}

impl Fixtures {
    fn new() -> Self {
        Self { dir: TempDir::new().expect("temp dir") }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("fixture should be written");
        path
    }

    fn quote_args(&self, coupons: &str) -> QuoteArgs {
        QuoteArgs {
            cart: self.write("cart.json", CART),
            coupons: self.write("coupons.json", coupons),
            now: Some(NOW.to_string()),
            ..QuoteArgs::default()
        }
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(raw) => Decimal::from_str(raw).expect("decimal string"),
        other => Decimal::from_str(&other.to_string()).expect("decimal number"),
    }
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CARTWRIGHT_ENGINE_CURRENCY",
        "CARTWRIGHT_ENGINE_MINOR_UNIT_SCALE",
        "CARTWRIGHT_ENGINE_ROUNDING",
        "CARTWRIGHT_ENGINE_EMPTY_BOGO_ALLOW_LIST",
        "CARTWRIGHT_LOGGING_LEVEL",
        "CARTWRIGHT_LOGGING_FORMAT",
        "CARTWRIGHT_LOG_LEVEL",
        "CARTWRIGHT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
