pub mod cli;
pub mod commands;
pub mod error;

pub mod core {
    pub mod block_split;
    pub mod format;
    pub mod record;
    pub mod site;
}

pub mod io {
    pub mod batcher;
    pub mod gvcf_reader;
    pub mod gvcf_writer;
    pub mod readers;
}

pub mod utils {
    pub mod util;
}

pub mod constants;

pub use constants::*;
