use std::collections::BTreeMap;

/// Rank of a participant in a communicator group (0-indexed).
pub type Rank = u32;

/// Signed byte offset into a file, the width of an MPI offset.
pub type Offset = i64;

/// Element types a write can be described in.
///
/// Only the element width matters to the shared file pointer: a write of
/// `count` elements moves `count * size_in_bytes()` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Byte = 0,
    F32 = 1,
    F64 = 2,
    F16 = 3,
    BF16 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
    U16 = 8,
    U32 = 9,
    U64 = 10,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::Byte => 1,
            DataType::F16 | DataType::BF16 | DataType::I16 | DataType::U16 => 2,
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Byte => "byte",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::F16 => "f16",
            DataType::BF16 => "bf16",
            DataType::I16 => "i16",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::U16 => "u16",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of I/O operation a metadata record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Write,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Read => f.write_str("read"),
            OperationKind::Write => f.write_str("write"),
        }
    }
}

/// File access mode bits, combined with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessMode(u32);

impl AccessMode {
    pub const RDONLY: AccessMode = AccessMode(0x01);
    pub const WRONLY: AccessMode = AccessMode(0x02);
    pub const RDWR: AccessMode = AccessMode(0x04);
    pub const CREATE: AccessMode = AccessMode(0x08);
    pub const EXCL: AccessMode = AccessMode(0x10);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: AccessMode) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the mode allows writing to the file.
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRONLY) || self.contains(Self::RDWR)
    }

    /// Whether the mode allows reading from the file.
    pub const fn is_readable(self) -> bool {
        self.contains(Self::RDONLY) || self.contains(Self::RDWR)
    }

    /// This mode with the bits of `other` cleared.
    pub const fn without(self, other: AccessMode) -> AccessMode {
        AccessMode(self.0 & !other.0)
    }
}

impl std::ops::BitOr for AccessMode {
    type Output = AccessMode;

    fn bitor(self, rhs: Self) -> Self::Output {
        AccessMode(self.0 | rhs.0)
    }
}

/// Key/value hints attached to an open file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info {
    entries: BTreeMap<String, String>,
}

impl Info {
    /// Hint naming the directory that holds the per-rank data files.
    pub const DATAFILE_DIR: &'static str = "sharedfp_datafile_dir";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
