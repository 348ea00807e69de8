use crate::domain::model::Claim;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClaimArg {
    True,
    False,
    Unknown,
}

impl From<ClaimArg> for Claim {
    fn from(arg: ClaimArg) -> Self {
        match arg {
            ClaimArg::True => Claim::Has,
            ClaimArg::False => Claim::HasNot,
            ClaimArg::Unknown => Claim::Unknown,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "dashboard_probe")]
#[command(about = "Assemble one owner dashboard against a live store and print the result")]
pub struct ProbeArgs {
    #[arg(long, help = "TOML configuration file; defaults are used when omitted")]
    pub config: Option<String>,

    #[arg(long, help = "Owner id to reconcile")]
    pub owner: String,

    #[arg(long, value_enum, default_value = "unknown", help = "Session claim to start from")]
    pub claim: ClaimArg,

    #[arg(long, help = "Emit JSON log lines instead of compact text")]
    pub json_logs: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}
