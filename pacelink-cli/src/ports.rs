use crate::LinkArgs;
use pacelink_lib::link;
use std::error::Error;

pub fn run(args: &LinkArgs) -> Result<(), Box<dyn Error>> {
    let config = args.session_config()?;
    let ports = link::list_ports()?;

    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    println!("{:<24} {:<9} {:<9} {:<16} {}", "PORT", "TYPE", "VID:PID", "SERIAL", "PRODUCT");
    for port in &ports {
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!("{:04x}:{:04x}", vid, pid),
            _ => "-".to_string(),
        };
        let marker = if port.matches(&config) { "" } else { "  (filtered out)" };
        println!(
            "{:<24} {:<9} {:<9} {:<16} {}{}",
            port.name,
            port.port_type,
            ids,
            port.serial_number.as_deref().unwrap_or("-"),
            port.product.as_deref().unwrap_or("-"),
            marker
        );
    }
    Ok(())
}
