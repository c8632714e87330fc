//! Text rendering of self-test outcomes.

use core::fmt;

use crate::params::{OverallResult, TestResult};
use crate::registers::LiveView;
use crate::self_test::SelfTestReport;

impl fmt::Display for SelfTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "acquisition engine : {}", self.acquisition().label())?;
        writeln!(f, "self-test status   : {}", self.live_view.self_test_status.label())?;
        write!(f, "overall result     : {}", self.overall.label())?;
        for (test, result) in self.results() {
            write!(f, "\n  {test}: {}", result.label())?;
        }
        Ok(())
    }
}

/// Full dump of every field in the `u07` live view.
impl fmt::Display for LiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "u07 live view")?;
        writeln!(f, "  ae status             : {}", self.acquisition.label())?;
        writeln!(f, "  u06 self-test status  : {}", self.self_test_status.label())?;
        write!(f, "  overall result        : {}", self.overall.label())?;
        if let OverallResult::Unknown(code) = self.overall {
            write!(f, " ({code:#04x})")?;
        }
        for (test, result) in self.results() {
            write!(f, "\n  {test}: {}", result.label())?;
            if let TestResult::Unknown(code) = result {
                write!(f, " ({code:#04x})")?;
            }
        }
        Ok(())
    }
}
