//! Sort expression compilation, including the seeded pseudo-random
//! ordering used by shuffle views.

use sha2::{Digest, Sha256};

use curio_model::{EntityKey, EntityKind, SortDirection, SortKey};

use crate::query::predicate::Bind;

/// Modulus for the seeded rank: 2^31 − 1. Reducing after every
/// multiplication keeps intermediates inside i64 range; without it the
/// arithmetic would overflow and ordering would stop being stable.
pub const RANK_MODULUS: i64 = 2_147_483_647;

/// A compiled ORDER BY expression with any bound values it needs.
#[derive(Debug, Clone)]
pub struct SortExpr {
    pub sql: String,
    pub binds: Vec<Bind>,
}

/// Multipliers derived from a caller-supplied seed. Both are clamped to
/// `1..RANK_MODULUS` so a zero seed still permutes.
fn seed_multipliers(seed: i64) -> (i64, i64) {
    let s1 = seed.rem_euclid(RANK_MODULUS - 1) + 1;
    let s2 = seed.rem_euclid(99_991) + 1;
    (s1, s2)
}

/// 32-bit key hash shared by the Rust and SQL sides of the rank: the
/// first four bytes of sha256 over `id@instance`, big-endian.
fn key_hash(key: &EntityKey) -> i64 {
    let digest = Sha256::digest(key.to_string().as_bytes());
    i64::from(u32::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3],
    ]))
}

/// Deterministic per-row rank for a given seed. The same `(seed, key)`
/// always yields the same rank, so a fixed seed gives stable shuffle
/// pagination across page fetches.
pub fn seeded_rank(key: &EntityKey, seed: i64) -> i64 {
    let (s1, s2) = seed_multipliers(seed);
    let mut rank = key_hash(key) % RANK_MODULUS;
    rank = (rank * s1) % RANK_MODULUS;
    rank = (rank * s2) % RANK_MODULUS;
    rank
}

/// SQL twin of [`seeded_rank`] over the row's composite primary key.
fn seeded_rank_sql(seed: i64) -> SortExpr {
    let (s1, s2) = seed_multipliers(seed);
    SortExpr {
        sql: "MOD(MOD(MOD(('x' || substr(encode(sha256(convert_to(e.id || '@' || e.instance_id, 'UTF8')), 'hex'), 1, 8))::bit(32)::bigint, 2147483647) * ?, 2147483647) * ?, 2147483647)"
            .to_string(),
        binds: vec![Bind::Int(s1), Bind::Int(s2)],
    }
}

/// Human-facing name column per kind, used for sorting and tie-breaks.
pub fn name_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Scene | EntityKind::Gallery | EntityKind::Image | EntityKind::Clip => {
            "e.title"
        }
        EntityKind::Performer
        | EntityKind::Studio
        | EntityKind::Tag
        | EntityKind::Group => "e.name",
    }
}

/// Maps a sort key to an expression for one entity kind. Unknown or
/// inapplicable keys fall back to creation time. Overlay-backed keys use
/// the same three-tier fallback as the filter compiler.
fn primary_expression(kind: EntityKind, key: SortKey) -> String {
    match key {
        SortKey::Name => format!("LOWER({})", name_column(kind)),
        SortKey::CreatedAt => "e.created_at".to_string(),
        SortKey::Date => match kind {
            EntityKind::Performer | EntityKind::Studio | EntityKind::Tag => {
                "e.created_at".to_string()
            }
            _ => "e.date".to_string(),
        },
        SortKey::Rating => match kind {
            EntityKind::Tag => "e.created_at".to_string(),
            _ => "COALESCE(o.rating, e.rating, 0)".to_string(),
        },
        SortKey::OCount => "COALESCE(o.o_count, 0)".to_string(),
        SortKey::PlayCount => "COALESCE(o.play_count, 0)".to_string(),
        SortKey::ViewCount => "COALESCE(o.view_count, 0)".to_string(),
        SortKey::Duration => match kind {
            EntityKind::Scene => "e.duration".to_string(),
            _ => "e.created_at".to_string(),
        },
        SortKey::Random => unreachable!("random sort is compiled separately"),
    }
}

/// Compiles the full ORDER BY body (without the keyword). A secondary
/// tie-break is always appended so equal-rank rows keep a stable relative
/// order across pages.
pub fn order_by(
    kind: EntityKind,
    key: SortKey,
    direction: SortDirection,
    random_seed: i64,
) -> SortExpr {
    let dir = match direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };

    let (mut sql, binds) = if key == SortKey::Random {
        let rank = seeded_rank_sql(random_seed);
        (format!("{} {}", rank.sql, dir), rank.binds)
    } else {
        (
            format!("{} {} NULLS LAST", primary_expression(kind, key), dir),
            Vec::new(),
        )
    };

    if key != SortKey::Name {
        sql.push_str(&format!(", LOWER({}) ASC NULLS LAST", name_column(kind)));
    }
    sql.push_str(", e.id ASC, e.instance_id ASC");

    SortExpr { sql, binds }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<EntityKey> {
        (0..n)
            .map(|i| EntityKey::new(format!("{i}"), "alpha"))
            .collect()
    }

    #[test]
    fn rank_is_deterministic_and_seed_sensitive() {
        let key = EntityKey::new("1234", "alpha");
        assert_eq!(seeded_rank(&key, 42), seeded_rank(&key, 42));
        assert_ne!(seeded_rank(&key, 42), seeded_rank(&key, 43));
        assert!(seeded_rank(&key, 42) >= 0);
        assert!(seeded_rank(&key, -7) >= 0);
    }

    #[test]
    fn rank_stays_below_the_modulus() {
        for (i, key) in keys(500).iter().enumerate() {
            let rank = seeded_rank(key, i as i64 * 7919);
            assert!((0..RANK_MODULUS).contains(&rank));
        }
    }

    /// Concatenating pages 1..N under a fixed seed must reproduce the
    /// unpaginated order with no duplicate and no omitted id.
    #[test]
    fn shuffle_pagination_concatenates_cleanly() {
        let seed = 987_654_321;
        let mut all = keys(103);
        all.sort_by_key(|k| (seeded_rank(k, seed), k.clone()));

        // Fetch each page independently, re-sorting a differently-ordered
        // candidate set every time, the way separate requests would.
        let per_page = 10;
        let mut paged = Vec::new();
        for page in 0..=(all.len() / per_page) {
            let mut candidates = keys(103);
            candidates.reverse();
            candidates.sort_by_key(|k| (seeded_rank(k, seed), k.clone()));
            let start = page * per_page;
            let end = (start + per_page).min(candidates.len());
            paged.extend_from_slice(&candidates[start..end]);
        }
        assert_eq!(paged, all);

        let mut unique = paged.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn random_order_by_binds_two_multipliers() {
        let expr = order_by(
            EntityKind::Scene,
            SortKey::Random,
            SortDirection::Ascending,
            42,
        );
        assert_eq!(expr.binds.len(), 2);
        assert!(expr.sql.contains("2147483647"));
        assert!(expr.sql.ends_with("e.id ASC, e.instance_id ASC"));
    }

    #[test]
    fn non_name_sorts_append_name_tiebreak() {
        let expr = order_by(
            EntityKind::Performer,
            SortKey::Rating,
            SortDirection::Descending,
            0,
        );
        assert!(expr.sql.starts_with("COALESCE(o.rating, e.rating, 0) DESC"));
        assert!(expr.sql.contains("LOWER(e.name) ASC"));
    }
}
