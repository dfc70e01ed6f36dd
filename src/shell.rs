//! シェルのプロセス全体で共有する状態。
//!
//! グローバル変数ではなく 1 つの構造体としてコマンドループに引き回す。
//! 唯一の例外はフォアグラウンド専用モードのフラグで、SIGTSTP ハンドラから
//! 書く必要があるため [`signals`](crate::signals) の atomic として持つ。

use libc::pid_t;

use crate::job::JobTable;

/// シェルの実行状態。生成は起動時に 1 回、寿命はプロセスと同じ。
pub struct Shell {
    /// 直前のフォアグラウンドコマンドの raw wait ステータス。
    /// 事前に復号せず保持し、`status` ビルトインの表示時に復号する。
    /// 書き込むのはフォアグラウンド起動パスとリダイレクト失敗パスのみで、
    /// バックグラウンドの完了は書き込まない。
    pub last_status: i32,
    /// バックグラウンドジョブのテーブル。
    pub jobs: JobTable,
    /// シェル自身の PID。`$$` 展開に使う。
    pub shell_pid: pid_t,
}

impl Shell {
    pub fn new() -> Self {
        Self {
            last_status: 0,
            jobs: JobTable::new(),
            shell_pid: unsafe { libc::getpid() },
        }
    }
}
