use clap::Args;

/// Assemble one broadcast and write it to the output file.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Seed for show, episode, bumper and ad selection; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,
}
