use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use myo_raw::{
    Attribute, AttributeHandle, DataCategory, DeviceAddress, EmgMode, EmgSample, FakeAdvertisement,
    FakeDongle, FakeDongleConfig, FakeDongleLog, ImuMode, LinkError, MYO_SERVICE_ID, Myo,
    MyoError, MyoEvent, Opcode, Pose, ProtocolVariant, Rgb, SessionState, SleepMode, StopReason,
    SubscribeOptions, Vibration,
};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const SMOOTHED_EMG: &str = "0100020003000400050006000700080001";

fn address(text: &str) -> DeviceAddress {
    text.parse().expect("valid address")
}

fn session(config: FakeDongleConfig) -> (Myo<FakeDongle>, Arc<Mutex<FakeDongleLog>>) {
    let dongle = FakeDongle::new(config);
    let log = dongle.log();
    (Myo::new(dongle), log)
}

fn written_handles(log: &FakeDongleLog) -> Vec<u16> {
    log.writes()
        .iter()
        .map(|write| write.handle().value())
        .collect()
}

fn notification(handle: Attribute, hex: &str) -> (AttributeHandle, Vec<u8>) {
    (handle.handle(), hex::decode(hex).expect("valid hex"))
}

fn collect(myo: &mut Myo<FakeDongle>, category: DataCategory) -> Arc<Mutex<Vec<MyoEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    myo.add_handler(category, move |event| {
        sink.lock().push(*event);
        Ok(())
    });
    seen
}

#[test]
fn modern_firmware_subscribes_selected_streams() -> Result<(), MyoError> {
    let (mut myo, log) = session(FakeDongleConfig::default());

    let summary = myo.connect_first(None, &SubscribeOptions::default())?;

    assert_eq!(address("c0:ff:ee:00:00:01"), summary.address);
    assert_eq!(ProtocolVariant::Modern, summary.protocol);
    assert_eq!(SessionState::Subscribed, myo.state());
    let log = log.lock();
    assert_eq!(
        vec![0x1d, 0x24, 0x12, 0x2c, 0x2f, 0x32, 0x35, 0x19],
        written_handles(&log)
    );
    assert_eq!(
        vec![&[0x01, 0x03, 0x03, 0x01, 0x01][..]],
        log.writes_to(Attribute::Command.handle())
    );
    Ok(())
}

#[test]
fn legacy_firmware_uses_fixed_plan_and_skips_status_reads() -> Result<(), MyoError> {
    let (mut myo, log) = session(FakeDongleConfig::builder().firmware([0, 9, 0, 1]).build());

    let summary = myo.connect_first(None, &SubscribeOptions::default())?;

    assert_eq!(ProtocolVariant::Legacy, summary.protocol);
    let log = log.lock();
    assert_eq!(
        vec![0x19, 0x2f, 0x2c, 0x32, 0x35, 0x28, 0x1d, 0x19],
        written_handles(&log)
    );
    let read_handles: Vec<u8> = log
        .commands()
        .iter()
        .filter(|command| command.opcode() == Opcode::ATTCLIENT_READ_BY_HANDLE)
        .map(|command| command.payload()[1])
        .collect();
    assert_eq!(vec![0x17], read_handles);
    Ok(())
}

#[test]
fn notifications_reach_handlers_by_category() -> Result<(), MyoError> {
    let config = FakeDongleConfig::builder()
        .notifications(vec![
            notification(Attribute::SmoothedEmg, SMOOTHED_EMG),
            notification(Attribute::ClassifierEvent, "030100"),
            notification(Attribute::BatteryLevel, "50"),
            notification(Attribute::ClassifierEvent, "01020100"),
        ])
        .build();
    let (mut myo, _log) = session(config);
    let emg = collect(&mut myo, DataCategory::Emg);
    let pose = collect(&mut myo, DataCategory::Pose);
    let battery = collect(&mut myo, DataCategory::Battery);
    let arm = collect(&mut myo, DataCategory::Arm);

    let options = SubscribeOptions::builder()
        .emg_mode(EmgMode::Smoothed)
        .build();
    myo.connect_first(None, &options)?;
    let reason = myo.run_until(&CancellationToken::new(), POLL_INTERVAL)?;

    assert_eq!(StopReason::StreamClosed, reason);
    assert_eq!(
        vec![MyoEvent::Emg(EmgSample::Smoothed {
            values: [1, 2, 3, 4, 5, 6, 7, 8],
            moving: 1,
        })],
        *emg.lock()
    );
    assert_eq!(vec![MyoEvent::Pose(Pose::Fist)], *pose.lock());
    assert_eq!(vec![MyoEvent::Battery(80)], *battery.lock());
    assert_matches!(arm.lock().as_slice(), [MyoEvent::Arm { .. }]);
    Ok(())
}

#[test]
fn battery_reads_are_kept_apart_from_battery_notifications() -> Result<(), MyoError> {
    let config = FakeDongleConfig::builder()
        .notifications(vec![notification(Attribute::BatteryLevel, "50")])
        .build();
    let (mut myo, _log) = session(config);
    let battery = collect(&mut myo, DataCategory::Battery);

    myo.connect_first(None, &SubscribeOptions::default())?;
    assert!(battery.lock().is_empty());

    assert_eq!(Some(87), myo.get_battery_level()?);
    myo.run_until(&CancellationToken::new(), POLL_INTERVAL)?;

    assert_eq!(vec![MyoEvent::Battery(80)], *battery.lock());
    Ok(())
}

#[test]
fn raw_emg_notification_yields_two_samples() -> Result<(), MyoError> {
    let config = FakeDongleConfig::builder()
        .notifications(vec![notification(
            Attribute::EmgData2,
            "0102030405060708f9fafbfcfdfeff00",
        )])
        .build();
    let (mut myo, _log) = session(config);
    let emg = collect(&mut myo, DataCategory::Emg);

    myo.connect_first(None, &SubscribeOptions::default())?;
    myo.run_until(&CancellationToken::new(), POLL_INTERVAL)?;

    assert_eq!(
        vec![
            MyoEvent::Emg(EmgSample::Raw {
                characteristic: 2,
                values: [1, 2, 3, 4, 5, 6, 7, 8],
            }),
            MyoEvent::Emg(EmgSample::Raw {
                characteristic: 2,
                values: [-7, -6, -5, -4, -3, -2, -1, 0],
            }),
        ],
        *emg.lock()
    );
    Ok(())
}

#[test]
fn malformed_and_unknown_notifications_are_skipped() -> Result<(), MyoError> {
    let config = FakeDongleConfig::builder()
        .notifications(vec![
            notification(Attribute::SmoothedEmg, "0100"),
            (AttributeHandle::new(0x7f), vec![0x01]),
            notification(Attribute::BatteryLevel, "41"),
        ])
        .build();
    let (mut myo, _log) = session(config);
    let emg = collect(&mut myo, DataCategory::Emg);
    let battery = collect(&mut myo, DataCategory::Battery);

    let options = SubscribeOptions::builder().imu_mode(ImuMode::Off).build();
    myo.connect_first(None, &options)?;
    myo.run_until(&CancellationToken::new(), POLL_INTERVAL)?;

    assert!(emg.lock().is_empty());
    assert_eq!(Some(&MyoEvent::Battery(65)), battery.lock().last());
    Ok(())
}

#[test]
fn scan_filter_skips_other_armbands() -> Result<(), MyoError> {
    let wanted = address("c0:ff:ee:00:00:03");
    let config = FakeDongleConfig::builder()
        .advertisements(vec![
            FakeAdvertisement::other(address("aa:bb:cc:dd:ee:ff")),
            FakeAdvertisement::myo(address("c0:ff:ee:00:00:02")),
            FakeAdvertisement::myo(wanted),
        ])
        .build();
    let (mut myo, log) = session(config);

    let found = myo.scan(&MYO_SERVICE_ID, Some(wanted))?;

    assert_eq!(wanted, found);
    assert_eq!(SessionState::Disconnected, myo.state());
    let opcodes: Vec<Opcode> = log
        .lock()
        .commands()
        .iter()
        .map(|command| command.opcode())
        .collect();
    assert_eq!(
        vec![
            Opcode::GAP_END_PROCEDURE,
            Opcode::CONNECTION_DISCONNECT,
            Opcode::CONNECTION_DISCONNECT,
            Opcode::CONNECTION_DISCONNECT,
            Opcode::GAP_DISCOVER,
            Opcode::GAP_END_PROCEDURE,
        ],
        opcodes
    );
    Ok(())
}

#[test]
fn rescanning_detaches_the_previous_connection() -> Result<(), MyoError> {
    let (mut myo, log) = session(FakeDongleConfig::builder().connection(1).build());
    myo.connect_first(None, &SubscribeOptions::default())?;
    assert_eq!(Some(1), myo.connection());

    myo.scan(&MYO_SERVICE_ID, None)?;

    assert_eq!(None, myo.connection());
    assert_eq!(None, myo.address());
    assert_eq!(None, myo.protocol());
    let sent = log.lock().commands().len();
    assert_eq!(None, myo.get_battery_level()?);
    assert_eq!(sent, log.lock().commands().len());
    Ok(())
}

#[test]
fn scan_without_a_match_fails_when_stream_closes() {
    let config = FakeDongleConfig::builder()
        .advertisements(vec![FakeAdvertisement::other(address("aa:bb:cc:dd:ee:ff"))])
        .build();
    let (mut myo, _log) = session(config);

    assert_matches!(
        myo.scan(&MYO_SERVICE_ID, None),
        Err(MyoError::Link(LinkError::StreamClosed))
    );
}

#[test]
fn device_commands_write_the_command_characteristic() -> Result<(), MyoError> {
    let (mut myo, log) = session(FakeDongleConfig::default());
    myo.connect_first(None, &SubscribeOptions::default())?;

    myo.set_sleep_mode(SleepMode::NeverSleep)?;
    myo.vibrate(Vibration::Long)?;
    myo.set_leds(Rgb::new(0, 255, 0), Rgb::new(0, 0, 255))?;

    let log = log.lock();
    let commands = log.writes_to(Attribute::Command.handle());
    assert_eq!(
        vec![
            &[0x09, 0x01, 0x01][..],
            &[0x03, 0x01, 0x03][..],
            &[0x06, 0x06, 0x00, 0xff, 0x00, 0x00, 0x00, 0xff][..],
        ],
        commands[1..].to_vec()
    );
    Ok(())
}

#[test]
fn deep_sleep_does_not_wait_for_completion() -> Result<(), MyoError> {
    let (mut myo, log) = session(FakeDongleConfig::default());
    myo.connect_first(None, &SubscribeOptions::default())?;

    myo.deep_sleep()?;

    assert_eq!(
        Some(&[0x04, 0x00][..]),
        log.lock()
            .writes_to(Attribute::Command.handle())
            .last()
            .copied()
    );
    Ok(())
}

#[test]
fn name_round_trips_through_the_armband() -> Result<(), MyoError> {
    let (mut myo, _log) = session(FakeDongleConfig::default());
    myo.connect_first(None, &SubscribeOptions::default())?;

    assert_eq!(Some("Simulated Myo".to_string()), myo.get_name()?);
    myo.set_name("Left Arm")?;
    assert_eq!(Some("Left Arm".to_string()), myo.get_name()?);
    assert_eq!(Some(87), myo.get_battery_level()?);
    Ok(())
}

#[test]
fn disconnect_is_idempotent_and_clears_handlers() -> Result<(), MyoError> {
    let (mut myo, log) = session(FakeDongleConfig::builder().connection(1).build());
    let _emg = collect(&mut myo, DataCategory::Emg);
    myo.connect_first(None, &SubscribeOptions::default())?;

    myo.disconnect()?;
    myo.disconnect()?;

    assert_eq!(SessionState::Disconnected, myo.state());
    assert_eq!(None, myo.connection());
    assert_eq!(0, myo.handler_count(DataCategory::Emg));
    assert_eq!(None, myo.get_name()?);
    let disconnects: Vec<u8> = log
        .lock()
        .commands()
        .iter()
        .filter(|command| command.opcode() == Opcode::CONNECTION_DISCONNECT)
        .map(|command| command.payload()[0])
        .collect();
    assert_eq!(vec![0, 1, 2, 1], disconnects);
    Ok(())
}
