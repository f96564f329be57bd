//! Pending work, as a bitmask of independent intents.

use core::fmt;

/// One unit of pending work.  Discriminants are bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Intent {
    Connect = 0,
    Auth = 1,
    GetMessages = 2,
    SendMessages = 3,
    SendSnapshot = 4,
    StreamFrame = 5,
    Probe = 6,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Self::Connect,
        Self::Auth,
        Self::GetMessages,
        Self::SendMessages,
        Self::SendSnapshot,
        Self::StreamFrame,
        Self::Probe,
    ];

    pub const fn mask(self) -> u8 {
        1 << self as u8
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct IntentSet(u8);

impl IntentSet {
    pub const EMPTY: Self = Self(0);

    pub const fn only(intent: Intent) -> Self {
        Self(intent.mask())
    }

    pub fn set(&mut self, intent: Intent) {
        self.0 |= intent.mask();
    }

    pub fn clear(&mut self, intent: Intent) {
        self.0 &= !intent.mask();
    }

    pub const fn contains(self, intent: Intent) -> bool {
        self.0 & intent.mask() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl FromIterator<Intent> for IntentSet {
    fn from_iter<I: IntoIterator<Item = Intent>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for i in iter {
            set.set(i);
        }
        set
    }
}

impl fmt::Debug for IntentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(Intent::ALL.iter().filter(|i| self.contains(**i)))
            .finish()
    }
}
