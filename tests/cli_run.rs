use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl myo_raw::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(args: myo_raw::Args) -> anyhow::Result<String> {
    let options = myo_raw::RunOptions::builder()
        .maybe_mac(args.mac())
        .maybe_output_format(args.output_format())
        .build();
    let (command, source) = args.into_command_and_source();
    let output =
        myo_raw::run_with_clients(command, source, options, Vec::new(), &FakeTerminalClient)
            .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    let parsed_args = myo_raw::Args::try_parse_from(argv)?;
    run_with_parsed_args(parsed_args).await
}

fn json_lines(stdout: &str) -> anyhow::Result<Vec<Value>> {
    Ok(stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?)
}

#[tokio::test]
async fn info_reports_armband_status_as_json() -> anyhow::Result<()> {
    let stdout = run_with_argv(["myo-raw", "--fake", "--fake-name", "Left Arm", "info"]).await?;

    let lines = json_lines(&stdout)?;
    assert_eq!(1, lines.len());
    assert_eq!(
        json!({
            "address": "c0:ff:ee:00:00:01",
            "connection": 0,
            "firmware": { "major": 1, "minor": 5, "patch": 1970, "hardware_revision": 2 },
            "protocol": "modern",
            "name": "Left Arm",
            "battery_level": 87,
        }),
        lines[0]
    );
    Ok(())
}

#[tokio::test]
async fn info_pretty_output_lists_connection_fields() -> anyhow::Result<()> {
    let fake = myo_raw::FakeArgs::builder()
        .firmware("0.9.0.1")?
        .battery_level(12)
        .build();
    let args = myo_raw::Args::new(myo_raw::Command::Info)
        .with_fake(fake)
        .with_mac("c0:ff:ee:00:00:09".parse()?);
    let options = myo_raw::RunOptions::builder()
        .maybe_mac(args.mac())
        .output_format(myo_raw::OutputFormat::Pretty)
        .build();
    let (command, source) = args.into_command_and_source();

    let output =
        myo_raw::run_with_clients(command, source, options, Vec::new(), &FakeTerminalClient)
            .await?;
    let stdout = String::from_utf8(output)?;

    assert!(stdout.starts_with("Connected armband:"));
    for expected in ["c0:ff:ee:00:00:09", "0.9.0.1", "legacy", "12%"] {
        assert!(stdout.contains(expected), "missing {expected}: {stdout}");
    }
    Ok(())
}

#[tokio::test]
async fn stream_stops_after_event_limit() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "myo-raw",
        "--fake",
        "--fake-notifications",
        "0x23:030100,0x11:50,0x23:030200",
        "stream",
        "--max-events",
        "2",
        "--poll-interval",
        "5ms",
    ])
    .await?;

    let lines = json_lines(&stdout)?;
    let records: Vec<&str> = lines
        .iter()
        .filter_map(|line| line["record"].as_str())
        .collect();
    assert_eq!(vec!["connected", "event", "event", "stopped"], records);
    assert_eq!(json!({ "category": "pose", "data": "fist" }), lines[1]["event"]);
    assert_eq!(json!({ "category": "battery", "data": 80 }), lines[2]["event"]);
    assert_eq!(
        json!({ "record": "stopped", "events": 2, "reason": "cancelled" }),
        lines[3]
    );
    Ok(())
}

#[tokio::test]
async fn stream_ends_when_simulated_dongle_runs_dry() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "myo-raw",
        "--fake",
        "--fake-notifications",
        "0x27:0100020003000400050006000700080001",
        "stream",
        "--emg-mode",
        "smoothed",
        "--imu-mode",
        "off",
        "--no-classifier",
        "--poll-interval",
        "5ms",
    ])
    .await?;

    let lines = json_lines(&stdout)?;
    let last = lines.last().cloned().unwrap_or_default();
    assert_eq!(
        json!({ "record": "stopped", "events": 1, "reason": "stream_closed" }),
        last
    );
    assert_eq!(
        json!({
            "category": "emg",
            "data": { "source": "smoothed", "values": [1, 2, 3, 4, 5, 6, 7, 8], "moving": 1 },
        }),
        lines[1]["event"]
    );
    Ok(())
}

#[tokio::test]
async fn control_leds_reports_applied_colours() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "myo-raw", "--fake", "control", "leds", "00ff00", "#0000FF",
    ])
    .await?;

    assert_eq!(
        vec![json!({ "action": "leds", "logo": "#00FF00", "line": "#0000FF" })],
        json_lines(&stdout)?
    );
    Ok(())
}

#[tokio::test]
async fn control_deep_sleep_completes_without_confirmation() -> anyhow::Result<()> {
    let stdout = run_with_argv(["myo-raw", "--fake", "control", "deep-sleep"]).await?;

    assert_eq!(vec![json!({ "action": "deep_sleep" })], json_lines(&stdout)?);
    Ok(())
}

#[tokio::test]
async fn control_rejects_oversized_name_before_writing() -> anyhow::Result<()> {
    let long_name = "x".repeat(300);
    let args = myo_raw::Args::try_parse_from([
        "myo-raw",
        "--fake",
        "control",
        "set-name",
        long_name.as_str(),
    ])?;

    let error = run_with_parsed_args(args)
        .await
        .expect_err("a 300 byte name cannot be written");
    assert!(
        format!("{error:#}").contains("device name is too long"),
        "unexpected error: {error:#}"
    );
    Ok(())
}

#[tokio::test]
async fn mac_filter_selects_the_requested_armband() -> anyhow::Result<()> {
    let stdout = run_with_argv(["myo-raw", "--fake", "--mac", "00:00:00:00:00:01", "info"]).await?;

    let lines = json_lines(&stdout)?;
    assert_eq!(json!("00:00:00:00:00:01"), lines[0]["address"]);
    Ok(())
}
