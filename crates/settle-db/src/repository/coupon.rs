//! # Coupon Repository
//!
//! Coupon lookup by code. Redemption (`used_count + 1`) is NOT here: it only
//! ever happens inside the order commit transaction.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use settle_core::Coupon;

const COUPON_COLUMNS: &str = "id, code, kind, value, max_discount_cents, min_order_cents, \
     valid_from, valid_until, usage_limit, used_count, is_active";

#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Looks up a coupon by its normalized (upper-case) code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        debug!(code = %code, "Looking up coupon");

        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = ?1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO coupons ({COUPON_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ))
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(coupon.kind)
        .bind(coupon.value)
        .bind(coupon.max_discount_cents)
        .bind(coupon.min_order_cents)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.usage_limit)
        .bind(coupon.used_count)
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{coupon, test_db};
    use crate::DbError;
    use settle_core::CouponKind;

    #[tokio::test]
    async fn test_get_by_code() {
        let db = test_db().await;
        let repo = db.coupons();
        repo.insert(&coupon("c-1", "SPRING", CouponKind::Fixed, 5_000, Some(3)))
            .await
            .unwrap();

        let found = repo.get_by_code("SPRING").await.unwrap().unwrap();
        assert_eq!(found.id, "c-1");
        assert_eq!(found.usage_limit, Some(3));
        assert_eq!(found.kind, CouponKind::Fixed);
        assert!(repo.get_by_code("spring").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let db = test_db().await;
        let repo = db.coupons();
        repo.insert(&coupon("c-1", "SPRING", CouponKind::Fixed, 100, None))
            .await
            .unwrap();

        let err = repo
            .insert(&coupon("c-2", "SPRING", CouponKind::Fixed, 100, None))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("coupons.code"));
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
