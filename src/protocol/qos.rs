use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const NUM_TIDS: usize = 8;
pub const NUM_ACS: usize = 4;

/// WMM access category, numbered by its ACI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessCategory {
    BestEffort = 0,
    Background = 1,
    Video = 2,
    Voice = 3,
}

impl AccessCategory {
    pub const ALL: [AccessCategory; NUM_ACS] = [
        AccessCategory::BestEffort,
        AccessCategory::Background,
        AccessCategory::Video,
        AccessCategory::Voice,
    ];

    #[must_use]
    #[inline]
    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(u8);

impl Tid {
    #[must_use]
    pub fn new(tid: u8) -> Option<Tid> {
        match (tid as usize) < NUM_TIDS {
            true => Some(Tid(tid)),
            false => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn to_u8(self) -> u8 {
        self.0
    }

    #[must_use]
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub fn access_category(self) -> AccessCategory {
        match self.0 {
            1 | 2 => AccessCategory::Background,
            4 | 5 => AccessCategory::Video,
            6 | 7 => AccessCategory::Voice,
            _ => AccessCategory::BestEffort,
        }
    }

    pub fn all() -> impl Iterator<Item = Tid> {
        (0..NUM_TIDS as u8).map(Tid)
    }
}
