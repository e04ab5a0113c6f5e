//! Command-line interface definitions and parsing

use clap::Parser;

/// Run one supervised bot instance.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Instance identifier; also names the per-instance state directory
    pub instance_id: String,

    /// Phone number for pairing-code registration (any formatting accepted)
    pub phone_number: Option<String>,

    /// Port for the loopback control surface
    pub control_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Base directory for instance state (overrides configuration)
    #[arg(short, long)]
    pub base_dir: Option<String>,

    /// Run against the in-process loopback transport instead of a real
    /// connection
    #[arg(long)]
    pub loopback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_arguments_parse() {
        let cli = Cli::parse_from(["herald", "bot-1", "15551234567", "3005"]);
        assert_eq!(cli.instance_id, "bot-1");
        assert_eq!(cli.phone_number.as_deref(), Some("15551234567"));
        assert_eq!(cli.control_port, Some(3005));
        assert!(!cli.verbose);
    }

    #[test]
    fn phone_and_port_are_optional() {
        let cli = Cli::parse_from(["herald", "bot-1", "--verbose"]);
        assert!(cli.phone_number.is_none());
        assert!(cli.control_port.is_none());
        assert!(cli.verbose);
    }
}
