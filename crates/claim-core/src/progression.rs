//! XP to level mapping. Levels are flat 100 XP bands starting at level 1.

use contracts::PlayerStats;

pub const XP_PER_LEVEL: u64 = 100;

/// Returns `(level, xp_to_next_level)` for an accumulated XP total.
pub fn level_for(total_xp: u64) -> (u64, u64) {
    let level = 1 + total_xp / XP_PER_LEVEL;
    let xp_to_next_level = (level * XP_PER_LEVEL).saturating_sub(total_xp);
    (level, xp_to_next_level)
}

/// Recomputes the derived level fields from `total_xp`.
pub fn refresh_level(stats: &mut PlayerStats) {
    let (level, xp_to_next_level) = level_for(stats.total_xp);
    stats.level = level;
    stats.xp_to_next_level = xp_to_next_level;
}

pub fn grant_xp(stats: &mut PlayerStats, amount: u64) {
    stats.total_xp = stats.total_xp.saturating_add(amount);
    refresh_level(stats);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_player_is_level_one_with_full_band_remaining() {
        assert_eq!(level_for(0), (1, 100));
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(level_for(99), (1, 1));
        assert_eq!(level_for(100), (2, 100));
        assert_eq!(level_for(250), (3, 50));
    }

    #[test]
    fn grant_updates_level_fields_in_place() {
        let mut stats = PlayerStats::default();
        grant_xp(&mut stats, 20);
        grant_xp(&mut stats, 85);
        assert_eq!(stats.total_xp, 105);
        assert_eq!(stats.level, 2);
        assert_eq!(stats.xp_to_next_level, 95);
    }

    #[test]
    fn refresh_repairs_stale_level_fields() {
        let mut stats = PlayerStats {
            total_xp: 430,
            level: 1,
            xp_to_next_level: 0,
            collected_loot_count: 2,
        };
        refresh_level(&mut stats);
        assert_eq!((stats.level, stats.xp_to_next_level), (5, 70));
        assert_eq!(stats.collected_loot_count, 2);
    }
}
