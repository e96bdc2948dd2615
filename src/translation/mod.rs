/*!
 * Narration translation using AI providers.
 *
 * - `core`: the `TranslationService`, prompt rendering and output cleanup
 */

pub use self::core::{TokenUsageStats, TranslationService};

pub mod core;
