// Statements issued by the SQLite row source. Identifiers are always quoted;
// values are always bound.

pub(crate) const SQL_TABLE_COLUMNS: &str =
    "SELECT name, type, pk FROM pragma_table_info(?1, ?2) ORDER BY cid";

pub(crate) fn quote_ident(name: &str) -> String {
    format!(r#""{}""#, name.replace('"', r#""""#))
}

pub(crate) fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn column_list<'a, I>(columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    columns
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<String>>()
        .join(", ")
}

fn where_sql(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// `SELECT ... LIMIT ? OFFSET ?`; the caller binds limit and offset after the
/// condition parameters.
pub(crate) fn sql_select_rows<'a, I>(
    schema: &str,
    table: &str,
    columns: I,
    conditions: &[String],
    order_by: &[String],
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
        column_list(columns),
        qualified_table(schema, table),
        where_sql(conditions),
        order_by.join(", "),
    )
}

pub(crate) fn sql_count_rows(schema: &str, table: &str, conditions: &[String]) -> String {
    format!(
        "SELECT COUNT(*) FROM {}{}",
        qualified_table(schema, table),
        where_sql(conditions),
    )
}

pub(crate) fn sql_select_row_by_id<'a, I>(
    schema: &str,
    table: &str,
    columns: I,
    primary_key_column: &str,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        column_list(columns),
        qualified_table(schema, table),
        quote_ident(primary_key_column),
    )
}

pub(crate) fn sql_select_ids(schema: &str, table: &str, primary_key_column: &str) -> String {
    let pk = quote_ident(primary_key_column);
    format!(
        "SELECT {pk} FROM {} WHERE {pk} IS NOT NULL ORDER BY {pk}",
        qualified_table(schema, table),
    )
}

pub(crate) fn sql_select_code_pairs(
    schema: &str,
    table: &str,
    id_column: &str,
    value_column: &str,
) -> String {
    format!(
        "SELECT {}, {} FROM {}",
        quote_ident(id_column),
        quote_ident(value_column),
        qualified_table(schema, table),
    )
}

pub(crate) fn sql_equals(column: &str) -> String {
    format!("{} = ?", quote_ident(column))
}

/// Envelope intersection test; binds minx, maxx, miny, maxy in that order.
pub(crate) fn sql_bbox_intersects(geometry_column: &str) -> String {
    let geom = quote_ident(geometry_column);
    format!(
        "({geom} IS NOT NULL AND ST_MaxX({geom}) >= ? AND ST_MinX({geom}) <= ? \
         AND ST_MaxY({geom}) >= ? AND ST_MinY({geom}) <= ?)"
    )
}

pub(crate) fn sql_order_term(column: &str, ascending: bool) -> String {
    format!(
        "{} {}",
        quote_ident(column),
        if ascending { "ASC" } else { "DESC" }
    )
}
