//! Integration tests for the processor module
//!
//! Runs the batch pipeline over small power logs written to temp directories.

pub mod basic_processing;

use std::fs;
use std::path::{Path, PathBuf};

/// Discharge run on an XO-1: three samples, two valid intervals
pub const DISCHARGE_LOG: &str = "XOVER:1
KERNAPI:0
DATE: 2010-03-16 14:00:00 UTC
BUILD: os802
BATSER: BAT-B
SERNUM: SHC00000002
<StartData>
1000,50,7200000,500,2500,100
1120,49,7150000,520,2510,80
1200,48,7100000,510,2505,60
";

/// Charge run on an XO-1: net charge gained
pub const CHARGE_LOG: &str = "XOVER:1
KERNAPI:0
DATE: 2010-03-15 09:30:00 UTC
BUILD: os802
BATSER: BAT-A
SERNUM: SHC00000001
<StartData>
1000,40,6500000,-800,2500,100
1120,42,6550000,-820,2510,140
1240,44,6600000,-810,2505,180
";

/// Only one sample: no interval ever meets the minimum period
pub const SHORT_LOG: &str = "XOVER:1
DATE: 2010-03-17 10:00:00 UTC
BATSER: BAT-C
<StartData>
1000,50,7200000,500,2500,100
";

pub fn write_log(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}
