// cli/mod.rs - Subcommands of the kickindex binary

pub mod index_stats;
