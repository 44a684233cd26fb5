//! Macros for reducing boilerplate.

/// Implement `FromRef<AppState>` for a cloneable field.
///
/// # Example
/// ```ignore
/// impl_from_ref!(AssignmentService, assignments);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for AssignmentService {
///     fn from_ref(state: &AppState) -> Self {
///         state.assignments.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
