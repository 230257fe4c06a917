/// Define a two-variant enum that maps to a single register bit.
///
/// The generated enum gets `from_bit`/`to_bit` conversions, a `Display` impl that prints the
/// variant name, and serde/clap derives when the invoking crate enables those features.
#[macro_export]
macro_rules! define_bit_enum {
    ($(#[$meta:meta])* $name:ident, [$zero:ident, $one:ident]) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Default,
            ::bincode::Encode,
            ::bincode::Decode,
        )]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
        pub enum $name {
            #[default]
            $zero = 0,
            $one = 1,
        }

        impl $name {
            #[inline]
            #[must_use]
            pub fn from_bit(bit: bool) -> Self {
                if bit { Self::$one } else { Self::$zero }
            }

            #[inline]
            #[must_use]
            pub fn to_bit(self) -> bool {
                self == Self::$one
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    Self::$zero => write!(f, stringify!($zero)),
                    Self::$one => write!(f, stringify!($one)),
                }
            }
        }
    };
}
