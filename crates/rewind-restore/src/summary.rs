//! Post-restore database summary
//!
//! Counts the tables of every user database on a restored cluster by running
//! the mysql client inside the first database pod.

use serde::Serialize;

use rewind_common::Error;

/// Container running mysqld in the database pods
pub const DB_CONTAINER: &str = "pxc";

/// Directory where the database operator mounts the users secret in each pod
pub const USERS_SECRET_DIR: &str = "/etc/mysql/mysql-users-secret";

/// Key of the root password in the users secret
pub const ROOT_PASSWORD_KEY: &str = "root";

/// Per-database table counts, system schemas excluded
pub const SUMMARY_QUERY: &str = "SELECT s.schema_name, COUNT(t.table_name) \
     FROM information_schema.schemata s \
     LEFT JOIN information_schema.tables t ON t.table_schema = s.schema_name \
     WHERE s.schema_name NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys') \
     GROUP BY s.schema_name ORDER BY s.schema_name";

/// Table count of one database
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseTables {
    /// Database name
    pub name: String,
    /// Number of tables
    pub tables: u64,
}

/// Databases and tables found on a restored cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSummary {
    /// Cluster that was queried
    pub cluster: String,
    /// Per-database counts, ordered by name
    pub databases: Vec<DatabaseTables>,
    /// Number of user databases
    pub total_databases: usize,
    /// Tables across all user databases
    pub total_tables: u64,
}

/// Pod the summary query runs in
pub fn query_pod(cluster: &str) -> String {
    format!("{}-pxc-0", cluster)
}

/// Command line for the summary query.
///
/// The root password is read inside the pod from the mounted users secret, so
/// it is neither part of the exec request nor of any process arguments.
pub fn summary_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "export MYSQL_PWD=\"$(cat {}/{})\"; exec mysql -uroot -N -B -e \"$0\"",
            USERS_SECRET_DIR, ROOT_PASSWORD_KEY
        ),
        SUMMARY_QUERY.to_string(),
    ]
}

/// Parse the tab-separated `schema<TAB>count` output of [`SUMMARY_QUERY`]
pub fn parse_summary(cluster: &str, output: &str) -> Result<DatabaseSummary, Error> {
    let mut databases = Vec::new();
    for line in output.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
        let (name, count) = line.split_once('\t').ok_or_else(|| {
            Error::serialization(format!("unexpected summary line '{}'", line))
        })?;
        let tables = count.trim().parse::<u64>().map_err(|_| {
            Error::serialization(format!("unexpected table count '{}' for {}", count, name))
        })?;
        databases.push(DatabaseTables {
            name: name.to_string(),
            tables,
        });
    }

    Ok(DatabaseSummary {
        cluster: cluster.to_string(),
        total_databases: databases.len(),
        total_tables: databases.iter().map(|d| d.tables).sum(),
        databases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summary() {
        let output = "inventory\t12\norders\t4\nstaging_scratch\t0\n";
        let summary = parse_summary("cluster1-pitr", output).unwrap();

        assert_eq!(summary.total_databases, 3);
        assert_eq!(summary.total_tables, 16);
        assert_eq!(
            summary.databases[0],
            DatabaseTables {
                name: "inventory".to_string(),
                tables: 12
            }
        );
        assert_eq!(summary.databases[2].tables, 0);
    }

    #[test]
    fn test_parse_empty_output() {
        let summary = parse_summary("c", "").unwrap();
        assert_eq!(summary.total_databases, 0);
        assert_eq!(summary.total_tables, 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_summary("c", "ERROR 1045 (28000): Access denied").is_err());
        assert!(parse_summary("c", "orders\tmany").is_err());
    }

    #[test]
    fn test_summary_command_keeps_password_out_of_arguments() {
        let cmd = summary_command();
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");
        assert!(cmd[2].contains("$(cat /etc/mysql/mysql-users-secret/root)"));
        assert!(cmd[2].contains("-N -B"));
        // The query travels as $0 so it needs no shell quoting
        assert_eq!(cmd.last().map(String::as_str), Some(SUMMARY_QUERY));
        assert!(SUMMARY_QUERY.contains("performance_schema"));
        assert_eq!(query_pod("cluster1-pitr"), "cluster1-pitr-pxc-0");
    }
}
