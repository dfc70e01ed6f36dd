//! ジョブテーブルとステータス復号ヘルパー。
//!
//! バックグラウンド起動された子プロセスの PID を記録し、コマンドループの
//! 先頭で非ブロッキングに reap する（[`JobTable::reap`]）。完了報告は
//! ジョブごとに最大 1 回で、報告済みエントリは tombstone として残り
//! 二度と報告されない。エントリはテーブルから物理削除しない。
//!
//! `waitpid` の raw ステータスはそのまま保持され、表示時に
//! [`status_line`] で遅延復号される。`status` ビルトインと reaper と
//! フォアグラウンドのシグナル死報告がすべて同じ復号を通る。

use libc::pid_t;

// ── データ構造 ───────────────────────────────────────────────────────

/// バックグラウンドジョブ 1 件分の記録。
///
/// PID はブックキーピング用で、プロセスの実体は OS が所有する。
pub struct JobEntry {
    /// 子プロセスの PID。
    pub pid: pid_t,
    /// reap 済みで完了報告も出力済みなら `true`（tombstone）。
    pub done: bool,
}

/// ジョブテーブル。追記のみの可変長リストで、上限はない。
///
/// tombstone 化されたエントリはスキップされるだけで削除されない。
/// `exit` 時の一斉 SIGTERM（[`kill_all`](JobTable::kill_all)）は
/// tombstone の有無にかかわらず全エントリに送る。
pub struct JobTable {
    entries: Vec<JobEntry>,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// バックグラウンド起動直後の子をテーブルに追加する。
    pub fn insert(&mut self, pid: pid_t) {
        self.entries.push(JobEntry { pid, done: false });
    }

    /// 起動直後の非ブロッキング reap が既に成功していた子を
    /// tombstone 済みで登録する。完了報告は呼び出し側が出力済み。
    pub fn insert_done(&mut self, pid: pid_t) {
        self.entries.push(JobEntry { pid, done: true });
    }

    /// 非 tombstone エントリを非ブロッキングに reap する。
    ///
    /// 終了していたプロセスごとに
    /// `background pid N is done: <status>` を出力して tombstone 化する。
    /// 報告順はテーブル順（登録順）であり、完了順ではない。
    pub fn reap(&mut self) {
        for entry in &mut self.entries {
            if entry.done {
                continue;
            }
            let mut raw: i32 = 0;
            let r = unsafe { libc::waitpid(entry.pid, &mut raw, libc::WNOHANG) };
            if r == entry.pid {
                println!("background pid {} is done: {}", entry.pid, status_line(raw));
                entry.done = true;
            }
            // r == 0: まだ実行中。r < 0 はここでは起きない想定で放置する
            // （フォアグラウンドの待機は常に特定 PID を指定する）。
        }
    }

    /// 全エントリに SIGTERM を送る。`exit` と EOF の終了パスから呼ばれる。
    ///
    /// tombstone も対象に含める。存在しない PID への kill の失敗は無視する。
    pub fn kill_all(&self) {
        for entry in &self.entries {
            unsafe {
                libc::kill(entry.pid, libc::SIGTERM);
            }
        }
    }

    /// 全エントリのイテレータ。
    pub fn iter(&self) -> impl Iterator<Item = &JobEntry> {
        self.entries.iter()
    }
}

// ── ステータス復号 ───────────────────────────────────────────────────

/// raw wait ステータスを報告文字列に復号する。
///
/// シグナル死なら `terminated by signal N`、それ以外は `exit value N`。
pub fn status_line(raw: i32) -> String {
    if libc::WIFSIGNALED(raw) {
        format!("terminated by signal {}", libc::WTERMSIG(raw))
    } else {
        format!("exit value {}", libc::WEXITSTATUS(raw))
    }
}

/// 終了コード `code` に相当する raw wait ステータスを合成する。
///
/// リダイレクト失敗（1）やディスクリプタ複製失敗（2）のような
/// シェル内製のステータスを、waitpid 由来の値と同じ経路で
/// 遅延復号できるようにするために使う。
pub fn exit_raw(code: i32) -> i32 {
    (code & 0xff) << 8
}

// ── テスト ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_exit_value() {
        assert_eq!(status_line(exit_raw(0)), "exit value 0");
        assert_eq!(status_line(exit_raw(1)), "exit value 1");
        assert_eq!(status_line(exit_raw(2)), "exit value 2");
    }

    #[test]
    fn decode_signal() {
        // SIGKILL で死んだ子の raw ステータスは下位 7 bit がシグナル番号
        assert_eq!(status_line(libc::SIGKILL), "terminated by signal 9");
        assert_eq!(status_line(libc::SIGTERM), "terminated by signal 15");
    }

    #[test]
    fn exit_raw_round_trip() {
        let raw = exit_raw(42);
        assert!(libc::WIFEXITED(raw));
        assert!(!libc::WIFSIGNALED(raw));
        assert_eq!(libc::WEXITSTATUS(raw), 42);
    }

    #[test]
    fn insert_and_iter() {
        let mut jobs = JobTable::new();
        jobs.insert(100);
        jobs.insert(200);
        let pids: Vec<_> = jobs.iter().map(|e| e.pid).collect();
        assert_eq!(pids, [100, 200]);
        assert!(jobs.iter().all(|e| !e.done));
    }

    #[test]
    fn reap_marks_real_child_done_once() {
        // 実際に子を fork して reap の at-most-once を確認する
        let pid = unsafe { libc::fork() };
        assert!(pid >= 0, "fork failed");
        if pid == 0 {
            unsafe { libc::_exit(7) };
        }

        let mut jobs = JobTable::new();
        jobs.insert(pid);

        // 子の終了を待ってから reap（テーブル自身の waitpid が拾えるよう
        // ここではブロッキング待機せず、終了をポーリングする）
        let mut reaped = false;
        for _ in 0..500 {
            jobs.reap();
            if jobs.iter().all(|e| e.done) {
                reaped = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(reaped, "child was never reaped");

        // tombstone 済みエントリは再報告されない（done のまま）
        jobs.reap();
        assert!(jobs.iter().all(|e| e.done));
    }
}
