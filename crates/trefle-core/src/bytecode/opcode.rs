//! Opcode table.
//!
//! The low byte of every opcode word is the total width of the instruction (opcode plus
//! operands); the remaining bits are a unique identifier.

use core::fmt;

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $word:literal ),* $(,)?) => {
        /// Opcodes understood by the VM. The discriminant is the encoded instruction word.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum OpCode {
            $( $(#[$doc])* $name = $word, )*
        }

        impl OpCode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Self] = &[ $( Self::$name, )* ];

            /// Decodes an instruction word; `None` for operands or garbage.
            pub const fn decode(word: i32) -> Option<Self> {
                match word {
                    $( $word => Some(Self::$name), )*
                    _ => None,
                }
            }

            /// Mnemonic.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name), )*
                }
            }
        }
    };
}

opcodes! {
    /// `Constant idx` : push `constants[idx]`.
    Constant       = 0x0001_02,
    /// Pop and remember as the frame's last popped value.
    Pop            = 0x0002_01,
    /// Push `true`.
    True           = 0x0003_01,
    /// Push `false`.
    False          = 0x0004_01,
    /// Push `null`.
    Null           = 0x0005_01,

    /// Binary `+`.
    Add            = 0x0100_01,
    /// Binary `-`.
    Sub            = 0x0101_01,
    /// Binary `*`.
    Mul            = 0x0102_01,
    /// Binary `/`.
    Div            = 0x0103_01,
    /// `==`.
    Equal          = 0x0104_01,
    /// `!=`.
    NotEqual       = 0x0105_01,
    /// `<`.
    Less           = 0x0106_01,
    /// `>`.
    Greater        = 0x0107_01,
    /// `<=`.
    LessEqual      = 0x0108_01,
    /// `>=`.
    GreaterEqual   = 0x0109_01,
    /// Boolean `and` (both operands evaluated).
    And            = 0x010A_01,
    /// Boolean `or` (both operands evaluated).
    Or             = 0x010B_01,
    /// Unary `-`.
    Negate         = 0x0110_01,
    /// Unary `not`.
    Not            = 0x0111_01,

    /// `Jump target` : absolute.
    Jump           = 0x1000_02,
    /// `JumpIf target` : pop a condition, jump when it is true.
    JumpIf         = 0x1001_02,

    /// `LocalGet slot`.
    LocalGet       = 0x0200_02,
    /// `LocalSet slot` : the value stays on the stack.
    LocalSet       = 0x0201_02,
    /// Pop a string key, push the global.
    GlobalGet      = 0x0202_01,
    /// Pop a string key, store the top of stack (kept) into globals.
    GlobalSet      = 0x0203_01,
    /// Pop a key, resolve against the receiver then the globals.
    EnvironmentGet = 0x0204_01,
    /// Pop a key, store the top of stack on the receiver or an existing global.
    EnvironmentSet = 0x0205_01,
    /// Pop key and target, push `target[key]`.
    InstanceGet    = 0x0206_01,
    /// Pop key, target and value, push the value after `target[key] = value`.
    InstanceSet    = 0x0207_01,
    /// Pop a key, resolve from the receiver class's parent.
    BaseGet        = 0x0208_01,
    /// Push the current receiver (or `null`).
    This           = 0x0209_01,

    /// `FreeVariable parent_slot slot` : push (pool index of `parent_slot`, `slot`).
    FreeVariable   = 0x0300_03,
    /// `Closure idx free_count`.
    Closure        = 0x0301_03,
    /// `Call argc`.
    Call           = 0x0302_02,
    /// Leave the current frame; the result stays on the stack.
    Return         = 0x0303_01,

    /// `NewArray count`.
    NewArray       = 0x0400_02,
    /// `NewMap count` : `count` key/value pairs.
    NewMap         = 0x0401_02,
    /// `NewClass count` : parent, then `count` name/value pairs.
    NewClass       = 0x0402_02,
}

impl OpCode {
    /// Encoded word.
    pub const fn word(self) -> i32 {
        self as i32
    }

    /// Total width in words (opcode + operands).
    pub const fn width(self) -> usize {
        (self as i32 & 0xFF) as usize
    }

    /// Number of operand words.
    pub const fn operand_count(self) -> usize {
        self.width() - 1
    }

    /// Identifier without the width byte.
    pub const fn id(self) -> i32 {
        (self as i32) >> 8
    }

    /// True for instructions whose first operand is an absolute jump target.
    pub const fn is_jump(self) -> bool {
        matches!(self, Self::Jump | Self::JumpIf)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
