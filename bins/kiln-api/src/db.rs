// Metadata store access. The dispatch API only ever reads test vectors;
// everything else about problems lives with the browsing services.

use sqlx::PgPool;

/// Fetch the hidden test vectors for a problem, in definition order.
///
/// Returns parallel input/output lists ready to drop into a `Job`.
pub async fn fetch_test_vectors(
    pool: &PgPool,
    problem_id: i32,
) -> Result<(Vec<String>, Vec<String>), sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT tin, tout FROM testcases WHERE problem_id = $1 ORDER BY testcase_id",
    )
    .bind(problem_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().unzip())
}
