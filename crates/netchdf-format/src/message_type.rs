//! HDF5 object header message type identifiers.

/// Header message types defined by the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Nil,
    Dataspace,
    LinkInfo,
    Datatype,
    FillValueOld,
    FillValue,
    Link,
    ExternalDataFiles,
    DataLayout,
    Bogus,
    GroupInfo,
    FilterPipeline,
    Attribute,
    Comment,
    ModificationTimeOld,
    SharedMessageTable,
    ObjectHeaderContinuation,
    SymbolTable,
    ModificationTime,
    BTreeKValues,
    DriverInfo,
    AttributeInfo,
    ReferenceCount,
    FileSpaceInfo,
    /// Type id outside the defined range.
    Unknown(u16),
}

impl MessageType {
    pub fn from_u16(val: u16) -> MessageType {
        match val {
            0x0000 => MessageType::Nil,
            0x0001 => MessageType::Dataspace,
            0x0002 => MessageType::LinkInfo,
            0x0003 => MessageType::Datatype,
            0x0004 => MessageType::FillValueOld,
            0x0005 => MessageType::FillValue,
            0x0006 => MessageType::Link,
            0x0007 => MessageType::ExternalDataFiles,
            0x0008 => MessageType::DataLayout,
            0x0009 => MessageType::Bogus,
            0x000A => MessageType::GroupInfo,
            0x000B => MessageType::FilterPipeline,
            0x000C => MessageType::Attribute,
            0x000D => MessageType::Comment,
            0x000E => MessageType::ModificationTimeOld,
            0x000F => MessageType::SharedMessageTable,
            0x0010 => MessageType::ObjectHeaderContinuation,
            0x0011 => MessageType::SymbolTable,
            0x0012 => MessageType::ModificationTime,
            0x0013 => MessageType::BTreeKValues,
            0x0014 => MessageType::DriverInfo,
            0x0015 => MessageType::AttributeInfo,
            0x0016 => MessageType::ReferenceCount,
            0x0017 => MessageType::FileSpaceInfo,
            other => MessageType::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            MessageType::Nil => 0x0000,
            MessageType::Dataspace => 0x0001,
            MessageType::LinkInfo => 0x0002,
            MessageType::Datatype => 0x0003,
            MessageType::FillValueOld => 0x0004,
            MessageType::FillValue => 0x0005,
            MessageType::Link => 0x0006,
            MessageType::ExternalDataFiles => 0x0007,
            MessageType::DataLayout => 0x0008,
            MessageType::Bogus => 0x0009,
            MessageType::GroupInfo => 0x000A,
            MessageType::FilterPipeline => 0x000B,
            MessageType::Attribute => 0x000C,
            MessageType::Comment => 0x000D,
            MessageType::ModificationTimeOld => 0x000E,
            MessageType::SharedMessageTable => 0x000F,
            MessageType::ObjectHeaderContinuation => 0x0010,
            MessageType::SymbolTable => 0x0011,
            MessageType::ModificationTime => 0x0012,
            MessageType::BTreeKValues => 0x0013,
            MessageType::DriverInfo => 0x0014,
            MessageType::AttributeInfo => 0x0015,
            MessageType::ReferenceCount => 0x0016,
            MessageType::FileSpaceInfo => 0x0017,
            MessageType::Unknown(v) => v,
        }
    }
}
