use maslow_config::{Config, load_toml};
use rstest::rstest;

fn four_belt_toml(port_line: &str) -> String {
    let mut s = String::from(
        r#"
[supervisor]
ms_per_cycle = 5

[i2c]
sda_pin = 8
scl_pin = 9
frequency_hz = 400000
"#,
    );
    for port in 0..4 {
        s.push_str("\n[[belt]]\n[belt.encoder]\n");
        if port == 0 && !port_line.is_empty() {
            s.push_str(port_line);
            s.push('\n');
        } else {
            s.push_str(&format!("port = {port}\n"));
        }
    }
    s
}

#[rstest]
fn accepts_default_rig() {
    let cfg = Config::default_rig();
    cfg.validate().expect("default rig should validate");
}

#[rstest]
fn accepts_four_belt_toml() {
    let cfg = load_toml(&four_belt_toml("")).expect("parse TOML");
    cfg.validate().expect("should validate");
    assert_eq!(cfg.belts.len(), 4);
    assert_eq!(cfg.supervisor.ms_per_cycle, 5);
}

#[rstest]
#[case::out_of_range("port = 4", "encoder.port must be in 0..=3")]
#[case::duplicate("port = 1", "used twice")]
fn rejects_bad_port_wiring(#[case] port_line: &str, #[case] expected: &str) {
    let cfg = load_toml(&four_belt_toml(port_line)).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject port wiring");
    let msg = format!("{err}");
    assert!(msg.contains(expected), "missing {expected:?} in: {msg}");
}

#[rstest]
fn rejects_wrong_belt_count() {
    let toml = r#"
[[belt]]
[belt.encoder]
port = 0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject single belt");
    assert!(format!("{err}").contains("exactly 4"));
}

#[rstest]
fn rejects_zero_cycle_period() {
    let mut cfg = Config::default_rig();
    cfg.supervisor.ms_per_cycle = 0;
    let err = cfg.validate().expect_err("should reject ms_per_cycle=0");
    assert!(format!("{err}").contains("ms_per_cycle must be >= 1"));
}

#[rstest]
fn rejects_warning_above_error_threshold() {
    let mut cfg = Config::default_rig();
    cfg.belts[2].motor.overcurrent_warning_a = 5.0;
    cfg.belts[2].motor.overcurrent_error_a = 3.0;
    let err = cfg.validate().expect_err("should reject inverted thresholds");
    let msg = format!("{err}");
    assert!(msg.contains("belt 2"), "missing belt index in: {msg}");
    assert!(msg.contains("must not exceed overcurrent_error_a"));
}

#[rstest]
fn rejects_excessive_pid_deadzone() {
    let mut cfg = Config::default_rig();
    cfg.belts[0].control.min_duty = 0.5;
    let err = cfg.validate().expect_err("should reject min_duty=0.5");
    assert!(format!("{err}").contains("min_duty must be in [0.0, 0.5)"));
}

#[rstest]
fn defaults_match_hardware() {
    let cfg = Config::default_rig();
    assert_eq!(cfg.i2c.address, 0x70);
    assert_eq!(cfg.belts[0].encoder.mm_per_revolution, 44.0);
    assert_eq!(cfg.belts[0].motor.pwm_frequency_hz, 4_000);
}
