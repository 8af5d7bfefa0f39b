//! 核心宏定义

/// 为结构体实现 Default trait 的宏
///
/// 使用示例:
/// ```rust
/// struct Viewport {
///     width: u32,
///     height: u32,
/// }
///
/// linkfield::impl_default!(Viewport {
///     width: 1,
///     height: 1,
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
