#[macro_export]
macro_rules! define_id_type {
    ($name: ident, $type: ident) => {
        #[derive(
            ::std::marker::Copy,
            ::std::clone::Clone,
            ::std::default::Default,
            ::std::hash::Hash,
            ::serde::Serialize,
            ::serde::Deserialize,
            ::std::cmp::Ord,
            ::std::cmp::PartialOrd,
            ::std::cmp::Eq,
            ::std::cmp::PartialEq,
        )]
        #[repr(transparent)]
        pub struct $name($type);

        impl $name {
            #[inline]
            pub fn new(value: $type) -> Self {
                Self(value)
            }

            #[inline]
            pub fn as_num(&self) -> $type {
                self.0
            }
        }

        impl ::std::convert::From<$type> for $name {
            #[inline]
            fn from(value: $type) -> Self {
                Self(value)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

define_id_type!(JobId, u64);
define_id_type!(TicketId, u64);
define_id_type!(CapsuleId, u32);
define_id_type!(SlotId, u32);
define_id_type!(TransitionId, u32);
define_id_type!(ScopeId, u32);

/// Monotonic id generator shared by the registry and the workflow engine.
#[derive(Debug, Default)]
pub struct IdCounter(u64);

impl IdCounter {
    pub fn new(initial_value: u64) -> Self {
        IdCounter(initial_value)
    }

    pub fn increment(&mut self) -> u64 {
        let value = self.0;
        self.0 += 1;
        value
    }
}
