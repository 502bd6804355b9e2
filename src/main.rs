use std::process::ExitCode;

use clap::Parser;

use myo_raw::{Args, Interrupted, RunOptions, run_with_options};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let run_result = async {
        let options = RunOptions::builder()
            .maybe_mac(args.mac())
            .maybe_log_level(args.log_level())
            .maybe_output_format(args.output_format())
            .build();
        let (command, source) = args.into_command_and_source();

        run_with_options(command, source, options, std::io::stdout()).await
    }
    .await;

    match run_result {
        Ok(_stdout) => ExitCode::SUCCESS,
        Err(error) if error.is::<Interrupted>() => {
            eprintln!("error: {error:#}");
            // The session thread is still blocked on the dongle and would
            // hold up runtime shutdown.
            std::process::exit(130);
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
