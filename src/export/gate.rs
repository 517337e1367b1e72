//! Category feature gate

use super::category::{Category, CategoryGroup};
use crate::config::FeatureFlags;

/// Whether downloads for `category` are switched on.
///
/// Market and index categories are always available; the risk groups follow
/// their flag.
pub fn is_download_category_enabled(flags: &FeatureFlags, category: Category) -> bool {
    match category.group() {
        CategoryGroup::Market | CategoryGroup::Index => true,
        CategoryGroup::Social => flags.social_data,
        CategoryGroup::Defi => flags.defi_data,
        CategoryGroup::Whale => flags.whale_data,
        CategoryGroup::Nft => flags.nft_data,
    }
}
