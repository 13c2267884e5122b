//! # クエリ結果の HTML 化
//!
//! 動的本文の生成で使う純粋な処理をまとめる。
//!
//! 1. 断片の列を逆順に連結してクエリ / テンプレートを組み立てる（[`assemble_fragments`]）
//! 2. クエリ結果から `<th>` / `<tr>` を生成し、テンプレートの
//!    `{headers}` / `{body}` を置換する（[`render_table`]）
//!
//! ## 断片の逆順連結について
//!
//! 設定ファイルの形式がネストしたキーを後ろから列挙するため、宣言順のまま連結すると
//! 文の順序が崩れる。既存の設定ファイルとの互換性のために逆順で連結している。
//! 意図された順序かどうかは設定ファイルの作成者に確認が取れていない。

/// 見出しセルを差し込むプレースホルダ
pub const HEADERS_PLACEHOLDER: &str = "{headers}";

/// 行を差し込むプレースホルダ
pub const BODY_PLACEHOLDER: &str = "{body}";

/// 表形式のクエリ結果
///
/// 列と行の順序はデータソースが返した順のまま保持する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows:    Vec<Vec<String>>,
}

impl TabularResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// 行が 1 件もない
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 断片を宣言と逆の順序で連結する
///
/// 各断片の後ろに改行を付ける。
///
/// ```rust
/// use remindmail_domain::report::assemble_fragments;
///
/// let query = assemble_fragments(&["SELECT 1".to_string(), "FROM T".to_string()]);
/// assert_eq!(query, "FROM T\nSELECT 1\n");
/// ```
pub fn assemble_fragments(fragments: &[String]) -> String {
    fragments.iter().rev().fold(String::new(), |mut acc, fragment| {
        acc.push_str(fragment);
        acc.push('\n');
        acc
    })
}

/// 列ごとの `<th>` 見出しセルを生成する（左寄せ）
pub fn header_cells(result: &TabularResult) -> String {
    result
        .columns
        .iter()
        .map(|column| format!("<th style='text-align:left'>{column}</th>\n"))
        .collect()
}

/// 行ごとの `<tr>` ブロックを生成する
///
/// 行のセル数が列数より多い場合、超過分は出力しない。
pub fn body_rows(result: &TabularResult) -> String {
    let width = result.columns.len();
    result
        .rows
        .iter()
        .map(|row| {
            let cells: String = row
                .iter()
                .take(width)
                .map(|value| format!("<td>{value}</td>\n"))
                .collect();
            format!("<tr>\n{cells}</tr>\n")
        })
        .collect()
}

/// テンプレートのプレースホルダをクエリ結果で置換する
///
/// 同じプレースホルダが複数回現れる場合は、すべて同じ内容で置換する。
pub fn render_table(template: &str, result: &TabularResult) -> String {
    template
        .replace(HEADERS_PLACEHOLDER, &header_cells(result))
        .replace(BODY_PLACEHOLDER, &body_rows(result))
}
