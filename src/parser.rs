//! トークナイザ + 展開: 入力 1 行から [`Command`] を構築する。
//!
//! ホワイトスペース区切りの単純なトークン分割のみで、クォートやエスケープは
//! 扱わない。対応するのは以下だけ:
//!
//! - `$$` 展開: トークン内の全出現をシェル自身の PID（10 進）に置換
//! - コメント/空行判定: 先頭トークンが `#` で始まる行と空行は [`Line::Empty`]
//! - バックグラウンドマーカー: 行末の単独トークン `&`
//! - リダイレクト: `<` / `>`（それぞれ直後のトークンがパス、各 1 個まで）
//!
//! このモジュールは失敗しない。不正な入力も分割結果のまま通す。
//! ファイルのオープンは executor 側の仕事で、ここではパスを記録するだけ。

use libc::pid_t;

/// 1 行の最大バイト数。超過分は文字境界で切り捨てる。
pub const MAX_LINE_LEN: usize = 2048;
/// 1 行の最大トークン数。超過分は無視する。
pub const MAX_ARGS: usize = 512;

// ── データ構造 ───────────────────────────────────────────────────────

/// 1 行分の解析済みコマンド。構築されたら即座に消費され、保持されない。
#[derive(Debug, PartialEq)]
pub struct Command {
    /// argv 相当のトークン列。最初のリダイレクト演算子より前の部分のみ。
    pub args: Vec<String>,
    /// 行末に単独トークン `&` があった場合に `true`。
    /// 実際にバックグラウンド実行するかはディスパッチ時点で
    /// フォアグラウンド専用モードと合成して決める。
    pub background: bool,
    /// `<` の直後に指定された入力リダイレクト先パス。
    pub stdin_path: Option<String>,
    /// `>` の直後に指定された出力リダイレクト先パス。
    pub stdout_path: Option<String>,
}

/// 解析結果。空行・コメント行はディスパッチ対象にならない。
#[derive(Debug, PartialEq)]
pub enum Line {
    /// 空行、コメント行、`&` のみの行。再プロンプトのみ行う。
    Empty,
    Command(Command),
}

// ── $$ 展開 ──────────────────────────────────────────────────────────

/// トークン内の `$$` をすべて `pid` の 10 進表記に置換する。
///
/// 左から右に走査し、置換結果を再走査しない。`$$` がトークン末尾に
/// 限らず中間にあっても前後を保ったまま継ぎ合わせる。
pub fn expand_pid(token: &str, pid: pid_t) -> String {
    if !token.contains("$$") {
        return token.to_string();
    }
    let pid_str = pid.to_string();
    let mut out = String::with_capacity(token.len() + pid_str.len());
    let mut rest = token;
    while let Some(idx) = rest.find("$$") {
        out.push_str(&rest[..idx]);
        out.push_str(&pid_str);
        rest = &rest[idx + 2..];
    }
    out.push_str(rest);
    out
}

// ── パース ───────────────────────────────────────────────────────────

/// 入力 1 行を解析して [`Line`] を返す。
///
/// 処理順:
/// 1. 行長を [`MAX_LINE_LEN`] に切り詰め（文字境界を守る）
/// 2. ホワイトスペース分割（[`MAX_ARGS`] 個まで）
/// 3. 空行・コメント判定
/// 4. 各トークンの `$$` 展開
/// 5. 行末 `&` の除去と background フラグ設定
/// 6. `<` / `>` の走査。argv は最初の演算子より前で打ち切る
pub fn parse(line: &str, shell_pid: pid_t) -> Line {
    let line = truncate_at_boundary(line, MAX_LINE_LEN);

    let mut tokens: Vec<String> = line
        .split_whitespace()
        .take(MAX_ARGS)
        .map(|t| expand_pid(t, shell_pid))
        .collect();

    // 空行 / コメント行 → ディスパッチなし
    if tokens.is_empty() || tokens[0].starts_with('#') {
        return Line::Empty;
    }

    // 行末の単独 `&` はバックグラウンド要求。途中の `&` は通常の引数。
    let background = tokens.last().map(|t| t == "&").unwrap_or(false);
    if background {
        tokens.pop();
    }
    if tokens.is_empty() {
        // `&` のみの行
        return Line::Empty;
    }

    // リダイレクト走査。argv は最初の演算子の手前まで。
    // 同じ演算子が複数あれば最後の指定が有効。
    let mut args_end = tokens.len();
    let mut stdin_path: Option<String> = None;
    let mut stdout_path: Option<String> = None;

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].as_str() {
            "<" => {
                args_end = args_end.min(i);
                if i + 1 < tokens.len() {
                    stdin_path = Some(tokens[i + 1].clone());
                    i += 2;
                    continue;
                }
                // 末尾の `<` はパスなし → リダイレクトを記録しない
                break;
            }
            ">" => {
                args_end = args_end.min(i);
                if i + 1 < tokens.len() {
                    stdout_path = Some(tokens[i + 1].clone());
                    i += 2;
                    continue;
                }
                break;
            }
            _ => i += 1,
        }
    }

    tokens.truncate(args_end);

    Line::Command(Command {
        args: tokens,
        background,
        stdin_path,
        stdout_path,
    })
}

/// `max` バイト以内に切り詰める。UTF-8 の文字境界を壊さないよう後退する。
fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ── テスト ───────────────────────────────────────────────────────────
