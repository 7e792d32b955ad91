use crate::LinkArgs;
use clap::Args;
use pacelink_lib::{Session, Supervisor};
use std::error::Error;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::info;

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    link: LinkArgs,
    /// How often to check that the device is still plugged in, in milliseconds
    #[arg(long, default_value = "2000")]
    presence_ms: u64,
    /// How often to print buffered samples, in milliseconds
    #[arg(long, default_value = "200")]
    display_ms: u64,
    /// Print one JSON object per sample
    #[arg(long)]
    json: bool,
    /// Only print the newest sample at each refresh
    #[arg(long)]
    latest: bool,
}

pub async fn run(args: &MonitorArgs) -> Result<(), Box<dyn Error>> {
    let session = Session::new(args.link.session_config()?);
    let sink = session.sink();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let supervisor = Supervisor::new(session.clone());
    let presence = Duration::from_millis(args.presence_ms.max(1));
    let supervising = tokio::spawn(supervisor.run_until(presence, async move {
        let _ = stop_rx.await;
    }));

    info!("Monitoring egram until interrupted (Ctrl+C)");
    let mut display = interval(Duration::from_millis(args.display_ms.max(1)));
    let mut total = 0u64;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = display.tick() => {
                let samples: Vec<_> = if args.latest {
                    sink.drain_all().last().copied().into_iter().collect()
                } else {
                    sink.drain_all()
                };
                for sample in samples {
                    total += 1;
                    if args.json {
                        println!("{}", serde_json::to_string(&sample)?);
                    } else {
                        println!("{:>8}  {}", total, sample);
                    }
                }
            }
        }
    }

    let _ = stop_tx.send(());
    supervising.await?;
    info!("{} samples shown, {} lost to overflow", total, sink.overwritten());
    Ok(())
}
