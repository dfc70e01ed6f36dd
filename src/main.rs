//! minish — 最小構成の対話シェル
//!
//! REPL ループ: ジョブ reap → プロンプト `: ` 表示 → 1 行読み取り →
//! パース → ビルトイン判定 → 外部コマンド実行 → ループ
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`parser`] | トークナイズ（`$$` 展開、コメント/空行、`&`、`<`/`>` 走査） |
//! | [`builtins`] | ビルトイン（`exit`, `cd`, `status`）— 常に同期実行 |
//! | [`executor`] | fork + execvp、リダイレクト適用、fg 待機 / bg 登録 |
//! | [`job`] | ジョブテーブル（非ブロッキング reap、tombstone、ステータス復号） |
//! | [`signals`] | SIGINT 無視、SIGTSTP によるフォアグラウンド専用モードのトグル |
//! | [`shell`] | シェルのプロセス全体状態（raw 終了ステータス、ジョブテーブル） |

mod builtins;
mod executor;
mod job;
mod parser;
mod shell;
mod signals;

use std::io::{self, BufRead, Write};

use shell::Shell;

/// プロンプトを表示して 1 行読み取る。EOF なら `None`。
///
/// SIGTSTP は `SA_RESTART` 付きで登録されるため、トグル中に届いても
/// read は同じ位置から再開する。万一 EINTR が漏れてきた場合は
/// プロンプトを出し直して読み直す。
fn read_line(stdin: &io::Stdin) -> Option<String> {
    loop {
        print!(": ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return None, // EOF (Ctrl+D)
            Ok(_) => return Some(line),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                eprintln!("minish: read: {}", e);
                return None;
            }
        }
    }
}

fn main() {
    // シェル本体のシグナル処理: SIGINT 無視、SIGTSTP でモードトグル。
    // フォアグラウンドの子の SIGINT 復元は executor が fork 後に行う。
    signals::install();

    let mut shell = Shell::new();
    let stdin = io::stdin();

    loop {
        // 次の行を読む前に必ず reap する。完了したバックグラウンドジョブの
        // 報告は次のプロンプトより先に表示される（テーブル順）。
        shell.jobs.reap();

        let line = match read_line(&stdin) {
            Some(line) => line,
            None => {
                // EOF: exit と同じ後始末でジョブを残さず終了する
                shell.jobs.kill_all();
                break;
            }
        };

        let cmd = match parser::parse(&line, shell.shell_pid) {
            parser::Line::Empty => continue, // 空行・コメント → 再プロンプト
            parser::Line::Command(cmd) => cmd,
        };
        if cmd.args.is_empty() {
            // リダイレクト指定のみでコマンド名がない行
            continue;
        }

        // ビルトインは `&` の有無にかかわらず同期実行し、executor を通さない
        let args: Vec<&str> = cmd.args.iter().map(|s| s.as_str()).collect();
        if builtins::try_exec(&mut shell, &args) {
            continue;
        }

        executor::execute(&mut shell, &cmd);
    }
}
