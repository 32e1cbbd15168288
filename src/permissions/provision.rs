use sqlx::SqlitePool;

use crate::AppResult;

use super::{Permission, Role};

/// Makes sure every permission row and the four role groups exist, with each
/// group holding exactly its role's permissions. Safe to run on every start.
pub async fn provision(db_pool: &SqlitePool) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;

    for perm in Permission::ALL {
        sqlx::query("INSERT INTO permissions (codename,name) VALUES (?,?) ON CONFLICT (codename) DO UPDATE SET name=excluded.name")
            .bind(perm.codename())
            .bind(perm.name())
            .execute(&mut *tx)
            .await?;
    }

    for role in Role::ALL {
        sqlx::query("INSERT OR IGNORE INTO groups (name) VALUES (?)")
            .bind(role.name())
            .execute(&mut *tx)
            .await?;

        let (group_id,): (i64,) = sqlx::query_as("SELECT id FROM groups WHERE name=?")
            .bind(role.name())
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM group_permissions WHERE group_id=?")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        for perm in role.permissions() {
            sqlx::query("INSERT INTO group_permissions (group_id,codename) VALUES (?,?)")
                .bind(group_id)
                .bind(perm.codename())
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    tracing::info!("permission groups provisioned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, AppResult};

    fn expected(role: Role) -> Vec<String> {
        let mut codenames: Vec<String> = role
            .permissions()
            .iter()
            .map(|p| p.codename().to_owned())
            .collect();
        codenames.sort();
        codenames
    }

    async fn group_permissions(db_pool: &SqlitePool, group_name: &str) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT gp.codename FROM group_permissions gp JOIN groups g ON g.id = gp.group_id WHERE g.name=? ORDER BY gp.codename",
        )
        .bind(group_name)
        .fetch_all(db_pool)
        .await?;
        Ok(rows.into_iter().map(|(codename,)| codename).collect())
    }

    #[tokio::test]
    async fn groups_hold_exactly_their_permissions() {
        let db_pool = db::temporary().await;
        provision(&db_pool).await.unwrap();

        let groups = [
            "Content Contributor",
            "Content Manager",
            "User and Content Manager",
            "Community Admin",
        ];
        for (name, role) in groups.into_iter().zip(Role::ALL) {
            assert_eq!(group_permissions(&db_pool, name).await.unwrap(), expected(role), "{name}");
        }
    }

    #[tokio::test]
    async fn provisioning_twice_repairs_drift() {
        let db_pool = db::temporary().await;
        provision(&db_pool).await.unwrap();

        sqlx::query("INSERT INTO group_permissions (group_id,codename) SELECT id,'add_community' FROM groups WHERE name='Content Contributor'")
            .execute(&db_pool)
            .await
            .unwrap();
        provision(&db_pool).await.unwrap();

        assert_eq!(
            group_permissions(&db_pool, "Content Contributor").await.unwrap(),
            expected(Role::ContentContributor)
        );
        let (groups,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM groups")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(groups, 4);
    }
}
