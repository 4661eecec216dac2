//! # Internal Macros
//!
//! Accessor generators for the scalar column kinds. Result sets address a
//! cell by `(row, col)`, cursors by `col` alone; both delegate to the same
//! descriptor-driven access layer, so the per-type wrappers are pure
//! boilerplate and generated here.

/// Generates `get_<name>_col` / `set_<name>_col` pairs on `ResultSet`.
macro_rules! result_set_scalar_accessors {
    ($($ty:ty => $name:ident),* $(,)?) => {
        ::paste::paste! {
            $(
                #[doc = concat!(
                    "Reads a ", stringify!($name),
                    " column; the same accessor serves not-null and nullable storage."
                )]
                pub fn [<get_ $name _col>](&self, row: usize, col: usize) -> $ty {
                    crate::rows::access::get_scalar(&self.desc, self.row_scalars(row), col)
                }

                #[doc = concat!("Writes a ", stringify!($name), " column, marking nullable storage present.")]
                pub fn [<set_ $name _col>](&mut self, row: usize, col: usize, value: $ty) {
                    let range = self.scalar_range(row);
                    crate::rows::access::set_scalar(&self.desc, &mut self.scalars[range], col, value)
                }
            )*
        }
    };
}

/// Generates `get_<name>` / `set_<name>` pairs on `Cursor`.
macro_rules! cursor_scalar_accessors {
    ($($ty:ty => $name:ident),* $(,)?) => {
        ::paste::paste! {
            $(
                pub fn [<get_ $name>](&self, col: usize) -> $ty {
                    crate::rows::access::get_scalar(&self.desc, &self.scalars, col)
                }

                pub fn [<set_ $name>](&mut self, col: usize, value: $ty) {
                    crate::rows::access::set_scalar(&self.desc, &mut self.scalars, col, value)
                }
            )*
        }
    };
}
