use enum_map::Enum;
use serde::{Deserialize, Serialize};

/// Current transformer inputs of the meter
#[derive(Debug, Enum, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Channel {
    Ct1,
    Ct2,
    Ct3,
}

impl Channel {
    /// 1-based number used in external names (`calibrationVal2`, `IRMS2`...)
    pub fn number(self) -> usize {
        self.into_usize() + 1
    }
}

/// A single analog input that can be read one raw sample at a time.
///
/// Read failures are reported as a zero sample; the meter cannot tell them
/// apart from a real low reading. Sources are created on the thread that
/// samples them, so they need not be `Send`.
pub trait SampleSource {
    fn read(&mut self) -> u16;
}

impl<T: SampleSource + ?Sized> SampleSource for Box<T> {
    fn read(&mut self) -> u16 {
        (**self).read()
    }
}
