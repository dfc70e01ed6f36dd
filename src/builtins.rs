//! ビルトインコマンドの実装。
//!
//! ビルトインは fork/exec を経由せずプロセス内で直接実行される。
//! `try_exec()` が `true` を返せばビルトインとして処理済み、`false` なら
//! 外部コマンドとして executor に委ねる。
//!
//! 3 つとも行末に `&` が付いていても常に同期実行される（呼び出し側が
//! executor より先にここを通すことで保証される）。

use std::env;
use std::path::Path;

use crate::job;
use crate::shell::Shell;

/// ビルトインコマンドの実行を試みる。
///
/// 戻り値:
/// - `true` — ビルトインとして実行済み
/// - `false` — 該当するビルトインなし（外部コマンドとして実行すべき）
pub fn try_exec(shell: &mut Shell, args: &[&str]) -> bool {
    match args[0] {
        "exit" => builtin_exit(shell),
        "cd" => builtin_cd(args),
        "status" => builtin_status(shell),
        _ => return false,
    }
    true
}

/// `exit` — 追跡中の全ジョブ（tombstone 含む）に SIGTERM を送り、
/// シェル自身をコード 0 で終了する。引数は取らない。
fn builtin_exit(shell: &mut Shell) -> ! {
    shell.jobs.kill_all();
    std::process::exit(0);
}

/// `cd [dir]` — カレントディレクトリを変更する。引数省略時（または引数が
/// `&` だけでパーサに剥がされた場合）は `$HOME` に移動。
///
/// 失敗は黙って握りつぶし、last_status も変更しない。
fn builtin_cd(args: &[&str]) {
    let target = match args.get(1) {
        Some(dir) => dir.to_string(),
        None => match env::var("HOME") {
            Ok(home) => home,
            Err(_) => return,
        },
    };
    let _ = env::set_current_dir(Path::new(&target));
}

/// `status` — 直前のフォアグラウンドコマンドの終了状態を報告する。
/// 保持している raw ステータスをここで初めて復号する。状態は変更しない。
fn builtin_status(shell: &Shell) {
    println!("{}", job::status_line(shell.last_status));
}

// ── テスト ───────────────────────────────────────────────────────────
