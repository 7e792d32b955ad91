use crate::LinkArgs;
use clap::Args;
use pacelink_lib::program::TracingAudit;
use pacelink_lib::{JsonStore, ProgrammingRequest, Receiver, Session};
use std::error::Error;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct ProgramArgs {
    #[command(flatten)]
    link: LinkArgs,
    /// Console data file holding modes and parameters
    #[arg(short, long, default_value = "pacemaker_data.json")]
    store: PathBuf,
    /// Whose saved parameters to send
    #[arg(short, long)]
    user: String,
    /// Send without waiting for the device to echo the frame back
    #[arg(long)]
    no_confirm: bool,
    /// Print the outbound frame as hex
    #[arg(long)]
    hex: bool,
}

pub async fn run(args: &ProgramArgs) -> Result<(), Box<dyn Error>> {
    let store = JsonStore::load(&args.store)?;
    let session = Session::new(args.link.session_config()?);
    if let Some(port) = session.try_connect()? {
        info!("Using {}", port.label());
    }

    let audit = TracingAudit;
    let request = ProgrammingRequest::new(&session).with_audit(&audit);

    if args.no_confirm {
        let frame = request.program(&store, &args.user)?;
        if args.hex {
            println!("{}", hex::encode(&frame));
        }
        println!("Sent {} bytes", frame.len());
        session.disconnect();
        return Ok(());
    }

    let receiver = Receiver::start(session.clone());
    let outcome = request.program_and_confirm(&store, &args.user).await;
    receiver.stop().await;

    let confirmation = outcome?;
    if args.hex {
        println!("{}", hex::encode(&confirmation.frame));
    }
    if confirmation.matches {
        println!("Device confirmed the parameters");
    } else {
        println!("Device echoed different values:");
        println!("{}", serde_json::to_string_pretty(&confirmation.echo.parameters)?);
    }
    Ok(())
}
