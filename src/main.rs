//! # declutter CLI
//!
//! Command-line interface for the disk declutter engine.
//!
//! ## Usage
//! ```bash
//! declutter duplicates ~/Pictures --threshold 5
//! declutter junk ~/storage --large-file-mb 100 --json
//! ```

mod cli;

use disk_declutter::Result;

fn main() -> Result<()> {
    disk_declutter::init_tracing();
    cli::run()
}
