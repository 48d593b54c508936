// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Register Access Traits
//!
//! Each register is described by a zero-sized descriptor type that ties its
//! address to a value type, which lets the port objects in `adiprobe-dap`
//! offer strongly typed accessors:
//!
//! * `adiprobe_dap::DebugPort::read_dp_register`
//! * `adiprobe_dap::DebugPort::write_dp_register`
//! * `adiprobe_dap::AccessPort::read`
//! * `adiprobe_dap::AccessPort::write`
//!
//! Addresses are 8 bits wide.  Bits 3:2 travel in the transaction request
//! (A[3:2]) and bits 7:4 are the register bank, which has to be placed in the
//! DP SELECT register before the access.

/// Base trait for all ARM debug register descriptors
pub trait RegisterDescriptor {
    const ADDRESS: u8;
    type Value;
}

/// Registers that can be read
pub trait ReadableRegister: RegisterDescriptor {
    /// Convert raw 32-bit data to register value
    fn from_raw(data: u32) -> Self::Value
    where
        Self::Value: From<u32>,
    {
        Self::Value::from(data)
    }
}

/// Registers that can be written
pub trait WritableRegister: RegisterDescriptor {
    /// Convert register value to raw 32-bit data
    fn to_raw(value: Self::Value) -> u32
    where
        Self::Value: Into<u32>,
    {
        value.into()
    }
}

/// Debug Port registers (accessed via DP transactions)
pub trait DpRegister: RegisterDescriptor {}

/// Access Port registers (accessed via AP transactions)
pub trait ApRegister: RegisterDescriptor {}

/// Register bank (bits 7:4) of a register address.
pub const fn bank(address: u8) -> u8 {
    (address >> 4) & 0xF
}

/// The A[3:2] part of a register address, as carried in a request.
pub const fn offset(address: u8) -> u8 {
    address & 0x0C
}

#[doc(hidden)]
#[macro_export]
macro_rules! register_data_display {
    ($name:ident) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}

/// Generate a read-only register data type
#[macro_export]
macro_rules! register_data_r {
    ($name:ident) => {
        $crate::register_data_display!($name);

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }
    };
}

/// Generate a read-write register data type
#[macro_export]
macro_rules! register_data_rw {
    ($name:ident) => {
        $crate::register_data_r!($name);
    };
}

/// Generate a write-only register data type
#[macro_export]
macro_rules! register_data_w {
    ($name:ident) => {
        $crate::register_data_display!($name);
    };
}

/// Declare a zero-sized register descriptor.
///
/// ```ignore
/// register!(CtrlStatRegister, 0x04, CtrlStat, DpRegister, read, write);
/// ```
#[macro_export]
macro_rules! register {
    (@access $desc:ident, read) => {
        impl $crate::arm::register::ReadableRegister for $desc {}
    };
    (@access $desc:ident, write) => {
        impl $crate::arm::register::WritableRegister for $desc {}
    };
    ($(#[$meta:meta])* $desc:ident, $addr:expr, $value:ty, $kind:ident $(, $access:ident)+) => {
        $(#[$meta])*
        pub struct $desc;

        impl $crate::arm::register::RegisterDescriptor for $desc {
            const ADDRESS: u8 = $addr;
            type Value = $value;
        }

        impl $crate::arm::register::$kind for $desc {}

        $($crate::register!(@access $desc, $access);)+
    };
}

/// Generate single-bit flag accessors for a register data type.
///
/// Each entry names a getter and, optionally, a chainable setter.
#[macro_export]
macro_rules! register_flags {
    ($name:ident { $($(#[$meta:meta])* $get:ident $(/ $set:ident)? = $mask:expr;)* }) => {
        impl $name {
            $(
                $(#[$meta])*
                pub const fn $get(&self) -> bool {
                    self.0 & $mask != 0
                }

                $(
                    pub fn $set(&mut self, enable: bool) -> &mut Self {
                        if enable {
                            self.0 |= $mask;
                        } else {
                            self.0 &= !$mask;
                        }
                        self
                    }
                )?
            )*
        }
    };
}
