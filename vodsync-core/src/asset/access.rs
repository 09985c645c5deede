use super::{Entitlement, VisibilityTier};

/// Tier/entitlement gate consulted wherever a playback URL is exposed.
pub fn can_access(tier: VisibilityTier, entitlement: Entitlement) -> bool {
    match tier {
        VisibilityTier::Freemium => true,
        VisibilityTier::Basic => matches!(
            entitlement,
            Entitlement::Basic | Entitlement::Premium | Entitlement::Admin
        ),
        VisibilityTier::Premium | VisibilityTier::Exclusive => {
            matches!(entitlement, Entitlement::Premium | Entitlement::Admin)
        }
    }
}

/// UI affordance only: the lock icon reflects the content's tier, not the
/// current viewer's access.
pub fn should_show_lock(tier: VisibilityTier) -> bool {
    tier != VisibilityTier::Freemium
}
