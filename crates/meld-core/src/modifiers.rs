//! Access and property modifier flags.
//!
//! Flag values follow the class-file access flag encoding so that a loader
//! can pass the raw value straight through.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A set of modifier flags on a type, field, or member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(u16);

impl Modifiers {
    /// No modifiers.
    pub const NONE: Self = Self(0);
    /// `public`.
    pub const PUBLIC: Self = Self(0x0001);
    /// `private`.
    pub const PRIVATE: Self = Self(0x0002);
    /// `protected`.
    pub const PROTECTED: Self = Self(0x0004);
    /// `static`.
    pub const STATIC: Self = Self(0x0008);
    /// `final`.
    pub const FINAL: Self = Self(0x0010);
    /// `synchronized` (members only).
    pub const SYNCHRONIZED: Self = Self(0x0020);
    /// `volatile` (fields only).
    pub const VOLATILE: Self = Self(0x0040);
    /// `transient` (fields only).
    pub const TRANSIENT: Self = Self(0x0080);
    /// `native` (members only).
    pub const NATIVE: Self = Self(0x0100);
    /// Interface type.
    pub const INTERFACE: Self = Self(0x0200);
    /// `abstract`.
    pub const ABSTRACT: Self = Self(0x0400);
    /// Compiler-generated.
    pub const SYNTHETIC: Self = Self(0x1000);

    /// Build from a raw flag value.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw flag value.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `static` flag.
    #[must_use]
    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// `synchronized` flag.
    #[must_use]
    pub const fn is_synchronized(self) -> bool {
        self.contains(Self::SYNCHRONIZED)
    }

    /// `transient` flag.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.contains(Self::TRANSIENT)
    }

    /// `volatile` flag.
    #[must_use]
    pub const fn is_volatile(self) -> bool {
        self.contains(Self::VOLATILE)
    }

    /// Interface flag.
    #[must_use]
    pub const fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    /// Whether the member is synchronized on its instance, i.e. carries its
    /// own mutual-exclusion declaration and is not type-level.
    #[must_use]
    pub const fn is_instance_synchronized(self) -> bool {
        self.is_synchronized() && !self.is_static()
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: &[(Modifiers, &str)] = &[
            (Modifiers::PUBLIC, "public"),
            (Modifiers::PRIVATE, "private"),
            (Modifiers::PROTECTED, "protected"),
            (Modifiers::STATIC, "static"),
            (Modifiers::FINAL, "final"),
            (Modifiers::SYNCHRONIZED, "synchronized"),
            (Modifiers::VOLATILE, "volatile"),
            (Modifiers::TRANSIENT, "transient"),
            (Modifiers::NATIVE, "native"),
            (Modifiers::INTERFACE, "interface"),
            (Modifiers::ABSTRACT, "abstract"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(*flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_synchronized() {
        assert!(Modifiers::SYNCHRONIZED.is_instance_synchronized());
        assert!(!(Modifiers::SYNCHRONIZED | Modifiers::STATIC).is_instance_synchronized());
        assert!(!Modifiers::PUBLIC.is_instance_synchronized());
    }

    #[test]
    fn raw_bits_round_trip() {
        let m = Modifiers::from_bits(0x0021);
        assert!(m.contains(Modifiers::PUBLIC));
        assert!(m.is_synchronized());
        assert_eq!(m.bits(), 0x0021);
    }

    #[test]
    fn display_lists_flags() {
        let m = Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::SYNCHRONIZED;
        assert_eq!(m.to_string(), "public static synchronized");
        assert_eq!(Modifiers::NONE.to_string(), "");
    }
}
