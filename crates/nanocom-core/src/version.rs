//! Version descriptor every component reports.

use std::fmt;

use once_cell::sync::OnceCell;

use crate::bounded::BoundedText;

/// Size in bytes of the description field, terminator included.
pub const DESCRIPTION_CAPACITY: usize = 0xFF;

/// Description text carried by a [`VersionDescriptor`].
pub type Description = BoundedText<DESCRIPTION_CAPACITY>;

/// Semantic version triple plus a short description.
///
/// Returned by value from the version query, so the layout is fixed:
/// three `u32` followed by a 255-byte text buffer.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionDescriptor {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub description: Description,
}

impl VersionDescriptor {
    /// Build a descriptor; a description longer than the buffer is truncated.
    pub fn new(major: u32, minor: u32, patch: u32, description: &str) -> Self {
        Self {
            major,
            minor,
            patch,
            description: Description::new(description),
        }
    }

    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// The version triple as a `semver::Version`, for reporting.
    pub fn semver(&self) -> semver::Version {
        semver::Version::new(
            u64::from(self.major),
            u64::from(self.minor),
            u64::from(self.patch),
        )
    }
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.description.is_empty() {
            write!(f, " ({})", self.description)?;
        }
        Ok(())
    }
}

impl fmt::Debug for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionDescriptor")
            .field("major", &self.major)
            .field("minor", &self.minor)
            .field("patch", &self.patch)
            .field("description", &self.description.as_str())
            .finish()
    }
}

/// Module-side cache for the version descriptor.
///
/// The descriptor is built on first query and every later query returns a
/// copy of that same value.
pub struct VersionCell {
    cell: OnceCell<VersionDescriptor>,
}

impl VersionCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> VersionDescriptor) -> VersionDescriptor {
        *self.cell.get_or_init(init)
    }

    /// The cached descriptor, if it has been produced yet.
    pub fn get(&self) -> Option<VersionDescriptor> {
        self.cell.get().copied()
    }
}

impl Default for VersionCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_fields() {
        let version = VersionDescriptor::new(1, 0, 0, "alpha test component");
        assert_eq!(version.major, 1);
        assert_eq!(version.description(), "alpha test component");
        assert_eq!(version.semver(), semver::Version::new(1, 0, 0));
        assert_eq!(version.to_string(), "1.0.0 (alpha test component)");
    }

    #[test]
    fn test_long_description_is_truncated() {
        let long = "d".repeat(1000);
        let version = VersionDescriptor::new(2, 1, 3, &long);
        assert_eq!(version.description().len(), DESCRIPTION_CAPACITY - 1);
        assert!(long.starts_with(version.description()));
    }

    #[test]
    fn test_layout_is_fixed() {
        assert_eq!(
            std::mem::size_of::<VersionDescriptor>(),
            // 3 * u32 + 255 bytes, padded to the u32 alignment
            (3 * 4 + DESCRIPTION_CAPACITY + 3) / 4 * 4
        );
        assert_eq!(std::mem::align_of::<VersionDescriptor>(), 4);
    }

    #[test]
    fn test_version_cell_initialises_once() {
        let cell = VersionCell::new();
        assert!(cell.get().is_none());

        let first = cell.get_or_init(|| VersionDescriptor::new(1, 2, 3, "first"));
        let second = cell.get_or_init(|| VersionDescriptor::new(9, 9, 9, "second"));
        assert_eq!(first, second);
        assert_eq!(second.description(), "first");
    }
}
