//! Validates the device description file shipped in config/

use std::path::Path;

use reactor_bus::config::ChannelKind;
use reactor_bus::DeviceFile;

fn shipped_file() -> DeviceFile {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/devices.yml");
    DeviceFile::load(&path).expect("shipped device file must parse")
}

#[test]
fn panel_is_complete() {
    let panel = shipped_file().panel("rod_control_panel").unwrap();

    let gauges = panel.aliases_of(ChannelKind::Gauge);
    let leds = panel.aliases_of(ChannelKind::Led);
    assert_eq!(gauges.len(), 25, "5x5 rod grid");
    assert_eq!(leds.len(), 25);

    // every gauge has its top-LED and both direction switches
    for gauge in &gauges {
        let base = gauge.strip_suffix("_gauge").unwrap();
        assert!(panel.resolve(&format!("{}_led", base)).is_some(), "{}", base);
        assert!(panel.resolve(&format!("{}_up", base)).is_some(), "{}", base);
        assert!(panel.resolve(&format!("{}_down", base)).is_some(), "{}", base);
    }

    // the physically dead positions are still wired
    assert!(panel.resolve("rod_5_3_led").is_some());
    assert!(panel.resolve("rod_3_0_led").is_some());

    assert!(panel.resolve("toptext").is_some());
}

#[test]
fn control_switches_resolve() {
    let panel = shipped_file().panel("rod_control_panel").unwrap();

    let arm = panel.resolve("commit_arm_key").unwrap();
    assert_eq!(arm.kind, ChannelKind::Switch);
    assert!(arm.active_low);

    let push = panel.resolve("commit_push").unwrap();
    assert!(!push.active_low);

    // reverse lookup from wire coordinates
    let (alias, _) = panel.switch_alias(arm.board, arm.channel).unwrap();
    assert_eq!(alias, "commit_arm_key");

    // placeholder switches never reach the runtime
    let unused = panel.resolve("unused_0").unwrap();
    assert!(panel.switch_alias(unused.board, unused.channel).is_none());
}
