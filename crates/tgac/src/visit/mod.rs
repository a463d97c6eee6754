//! visitor pattern helpers
mod visit_func_calls;
pub use visit_func_calls::VisitFuncCallsMut;

/// Visitor that visits is subjects mutably
pub trait VisitMut<T> {
    fn visit_mut(&mut self, value: &mut T);
}

// blanket impl for FnMut
impl<T, F> VisitMut<T> for F
where
    F: FnMut(&mut T),
{
    fn visit_mut(&mut self, value: &mut T) {
        self(value)
    }
}
