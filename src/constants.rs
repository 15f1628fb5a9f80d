// Instruction word layout
//
//          +--------+-------+------------------------+
//          |23    20|19   16|15                     0|
//          +--------+-------+------------------------+
//          |opclass | subop | per-mnemonic fields    |
//          +--------+-------+------------------------+

pub const WORD_WIDTH        : u32 = 24;
pub const WORD_MASK         : u32 = 0xFF_FFFF;

pub const LONG_WIDTH        : u32 = 48;
pub const LONG_MASK         : u64 = 0xFFFF_FFFF_FFFF;

pub const OPCLASS_WIDTH     : u32 = 4;
pub const OPCLASS_HI        : u8 = 23;
pub const OPCLASS_LO        : u8 = 20;

pub const SUBOP_WIDTH       : u32 = 4;
pub const SUBOP_HI          : u8 = 19;
pub const SUBOP_LO          : u8 = 16;

// All operand fields live below the sub-opcode.
pub const FIELD_HI          : u8 = 15;

pub const DR_COUNT          : u32 = 16;
pub const AR_COUNT          : u32 = 4;
pub const SR_COUNT          : u32 = 4;

pub const IMM_BANK_WIDTH    : u32 = 12;
