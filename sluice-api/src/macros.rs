//! Substate extraction for handlers.

/// Let a handler extract one field of [`AppState`](crate::state::AppState)
/// directly, e.g. `State(upload): State<UploadState>`.
///
/// ```ignore
/// impl_from_ref!(UploadState, upload);
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
