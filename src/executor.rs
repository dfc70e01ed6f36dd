//! コマンド実行: リダイレクト適用、fork + execvp、フォアグラウンド待機、
//! バックグラウンド登録。
//!
//! - [`execute`]: バックグラウンド要求とフォアグラウンド専用モードを
//!   ディスパッチ時点で合成し、fg/bg のどちらかのパスへ振り分ける
//! - リダイレクトはシェル自身の stdin/stdout を差し替えてから fork し、
//!   子に継承させる。差し替え前に [`StdioGuard`] が元のディスクリプタを
//!   `dup` で保存し、Drop で必ず復元する（早期 return 含む全経路）
//! - フォアグラウンドの子だけが fork 直後に SIGINT を `SIG_DFL` へ戻す。
//!   バックグラウンドの子は親の「無視」をそのまま継承する
//! - バックグラウンドでリダイレクト指定がなければ stdin/stdout とも
//!   `/dev/null` に接続し、端末を読んでブロックしたり出力を汚したりしない
//!
//! 失敗の扱い: ファイルオープン失敗はステータス 1 でこのコマンドのみ中止、
//! ディスクリプタ複製失敗はステータス 2 で同様に中止（シェルは続行）、
//! fork 失敗はシェルごと終了、exec 失敗は子だけがコード 1 で終了する。

use std::ffi::{CString, NulError};
use std::io;

use libc::pid_t;

use crate::job;
use crate::parser::Command;
use crate::shell::Shell;
use crate::signals;

// ── StdioGuard ────────────────────────────────────────────────────

/// シェル自身の stdin/stdout を保存し、Drop で復元する RAII ガード。
///
/// リダイレクトの有無にかかわらず起動パスの先頭で取得する。
/// これにより「シェル自身の I/O が前のコマンドに汚されたまま残らない」
/// という資源安全性の不変条件が、失敗時の早期 return を含む
/// すべての経路で成立する。
struct StdioGuard {
    saved_stdin: i32,
    saved_stdout: i32,
}

impl StdioGuard {
    /// 現在の stdin/stdout を `dup` で複製して保存する。
    /// 複製に失敗したら `None`（呼び出し側がステータス 2 で処理する）。
    fn capture() -> Option<Self> {
        let saved_stdin = unsafe { libc::dup(libc::STDIN_FILENO) };
        if saved_stdin < 0 {
            return None;
        }
        let saved_stdout = unsafe { libc::dup(libc::STDOUT_FILENO) };
        if saved_stdout < 0 {
            unsafe {
                libc::close(saved_stdin);
            }
            return None;
        }
        Some(Self {
            saved_stdin,
            saved_stdout,
        })
    }
}

impl Drop for StdioGuard {
    fn drop(&mut self) {
        unsafe {
            libc::dup2(self.saved_stdin, libc::STDIN_FILENO);
            libc::dup2(self.saved_stdout, libc::STDOUT_FILENO);
            libc::close(self.saved_stdin);
            libc::close(self.saved_stdout);
        }
    }
}

// ── CStringVec ────────────────────────────────────────────────────

/// execvp 用の argv。NULL 終端のポインタ配列を構築する。
///
/// fork より前に構築しておき、子プロセス側でのアロケーションを避ける。
struct CStringVec {
    _strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl CStringVec {
    /// NUL を含む引数は C 文字列として execvp に渡せないため `Err`。
    fn from_args(args: &[String]) -> Result<Self, NulError> {
        let strings = args
            .iter()
            .map(|s| CString::new(s.as_str()))
            .collect::<Result<Vec<CString>, NulError>>()?;
        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null()); // NULL 終端
        Ok(Self {
            _strings: strings,
            ptrs,
        })
    }

    /// argv[0]。
    fn arg0(&self) -> *const libc::c_char {
        self.ptrs[0]
    }

    /// NULL 終端ポインタ配列の先頭。
    fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

// ── リダイレクト適用 ──────────────────────────────────────────────

/// `path` を開いて `target_fd` に `dup2` する。
///
/// オープン失敗は `cannot open <path> for <direction>` を出力して `Err(1)`、
/// `dup2` 失敗は stderr に報告して `Err(2)`。どちらも fork は行われない。
fn redirect_from_file(
    path: &str,
    target_fd: i32,
    direction: &str,
    flags: i32,
    mode: libc::c_uint,
) -> Result<(), i32> {
    let c_path = match CString::new(path) {
        Ok(p) => p,
        Err(_) => {
            println!("cannot open {} for {}", path, direction);
            return Err(1);
        }
    };
    let fd = unsafe { libc::open(c_path.as_ptr(), flags, mode) };
    if fd < 0 {
        println!("cannot open {} for {}", path, direction);
        return Err(1);
    }
    let r = unsafe { libc::dup2(fd, target_fd) };
    unsafe {
        libc::close(fd);
    }
    if r < 0 {
        eprintln!("minish: dup2: {}", io::Error::last_os_error());
        return Err(2);
    }
    Ok(())
}

/// リダイレクトプランをシェル自身のディスクリプタに適用する。
///
/// バックグラウンドで明示指定がない系統は `/dev/null` に接続する。
fn apply_redirects(cmd: &Command, background: bool) -> Result<(), i32> {
    match &cmd.stdin_path {
        Some(path) => redirect_from_file(path, libc::STDIN_FILENO, "input", libc::O_RDONLY, 0)?,
        None if background => {
            redirect_from_file("/dev/null", libc::STDIN_FILENO, "input", libc::O_RDONLY, 0)?
        }
        None => {}
    }
    match &cmd.stdout_path {
        Some(path) => redirect_from_file(
            path,
            libc::STDOUT_FILENO,
            "output",
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o644,
        )?,
        None if background => {
            redirect_from_file("/dev/null", libc::STDOUT_FILENO, "output", libc::O_WRONLY, 0)?
        }
        None => {}
    }
    Ok(())
}

// ── 起動 ──────────────────────────────────────────────────────────

/// 特定の子プロセスを EINTR に耐えながらブロッキング待機する。
fn wait_blocking(pid: pid_t) -> i32 {
    let mut raw: i32 = 0;
    loop {
        let r = unsafe { libc::waitpid(pid, &mut raw, 0) };
        if r == pid {
            return raw;
        }
        if r < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            // ECHILD 等は起きない想定。万一なら 0 相当を返す
            return raw;
        }
    }
}

/// 外部コマンドを 1 つ実行する。
///
/// バックグラウンド要求はここで初めてフォアグラウンド専用モードと合成する。
/// トグルは行と行の間に非同期で届くため、解析時点の値は信用できない。
///
/// フォアグラウンド: 子の終了までブロックし、raw ステータスを保存する。
/// シグナル死だけは即時報告し、通常終了の報告は `status` まで遅延する。
/// バックグラウンド: ブロックせず、PID を報告してジョブテーブルに登録する。
pub fn execute(shell: &mut Shell, cmd: &Command) {
    let background = cmd.background && !signals::foreground_only();

    // ガードは無条件に取得する。取得できず、かつディスクリプタを
    // 差し替える必要がある場合のみこのコマンドを中止する。
    let needs_substitution =
        background || cmd.stdin_path.is_some() || cmd.stdout_path.is_some();
    let guard = StdioGuard::capture();
    if guard.is_none() && needs_substitution {
        eprintln!(
            "minish: cannot save standard descriptors: {}",
            io::Error::last_os_error()
        );
        shell.last_status = job::exit_raw(2);
        return;
    }

    if let Err(code) = apply_redirects(cmd, background) {
        shell.last_status = job::exit_raw(code);
        return; // guard の Drop が元のディスクリプタを復元する
    }

    // argv は fork 前に構築する
    let argv = match CStringVec::from_args(&cmd.args) {
        Ok(argv) => argv,
        Err(_) => {
            // exec 失敗と同じ扱い: プログラム名に帰属させて報告し、fork しない
            eprintln!("{}: invalid argument", cmd.args[0]);
            shell.last_status = job::exit_raw(1);
            return;
        }
    };

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        // プロセスを作れない OS 上でシェルは続行できない
        eprintln!("minish: fork: {}", io::Error::last_os_error());
        drop(guard);
        std::process::exit(1);
    }

    if pid == 0 {
        // ── 子プロセス ──
        if !background {
            // フォアグラウンドの子は SIGINT を既定動作に戻し、
            // 外部プログラム自身に処遇を委ねる
            unsafe {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
            }
        }
        unsafe {
            libc::execvp(argv.arg0(), argv.as_ptr());
        }
        // ここに来たら exec 失敗。プログラム名に帰属させて報告する
        eprintln!("{}: {}", cmd.args[0], io::Error::last_os_error());
        unsafe {
            libc::_exit(1);
        }
    }

    // ── 親プロセス ──
    if background {
        // 起動直後に 1 回だけ非ブロッキング reap を試みる（通常は未完了）
        let mut raw: i32 = 0;
        let r = unsafe { libc::waitpid(pid, &mut raw, libc::WNOHANG) };
        println!("background pid is {}", pid);
        if r == pid {
            // 既に終了していた: 完了報告をここで出し、tombstone 済みで登録
            println!("background pid {} is done: {}", pid, job::status_line(raw));
            shell.jobs.insert_done(pid);
        } else {
            shell.jobs.insert(pid);
        }
    } else {
        let raw = wait_blocking(pid);
        shell.last_status = raw;
        if libc::WIFSIGNALED(raw) {
            println!("terminated by signal {}", libc::WTERMSIG(raw));
        }
    }
    // guard の Drop で stdin/stdout が復元される
}

// ── テスト ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::exit_raw;
    use std::fs;
    use std::sync::Mutex;

    // どのテストもプロセス共有の stdin/stdout を差し替えるため直列化する
    static STDIO_LOCK: Mutex<()> = Mutex::new(());

    fn fg(args: &[&str]) -> Command {
        Command {
            args: args.iter().map(|s| s.to_string()).collect(),
            background: false,
            stdin_path: None,
            stdout_path: None,
        }
    }

    fn stat_fd(fd: i32) -> (u64, u64) {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let r = unsafe { libc::fstat(fd, &mut st) };
        assert_eq!(r, 0);
        (st.st_dev, st.st_ino)
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        let pid = unsafe { libc::getpid() };
        std::env::temp_dir().join(format!("minish-test-{}-{}", pid, name))
    }

    // ── StdioGuard ──

    #[test]
    fn guard_restores_stdout() {
        let _guard = STDIO_LOCK.lock().unwrap();
        let path = temp_path("guard.txt");
        let before = stat_fd(libc::STDOUT_FILENO);
        {
            let _guard = StdioGuard::capture().unwrap();
            redirect_from_file(
                path.to_str().unwrap(),
                libc::STDOUT_FILENO,
                "output",
                libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
                0o644,
            )
            .unwrap();
            assert_ne!(stat_fd(libc::STDOUT_FILENO), before);
        }
        // Drop 後に元の stdout へ戻っている
        assert_eq!(stat_fd(libc::STDOUT_FILENO), before);
        let _ = fs::remove_file(&path);
    }

    // ── フォアグラウンド ──

    #[test]
    fn foreground_exit_status_recorded() {
        let _guard = STDIO_LOCK.lock().unwrap();
        let mut shell = Shell::new();
        execute(&mut shell, &fg(&["true"]));
        assert!(libc::WIFEXITED(shell.last_status));
        assert_eq!(libc::WEXITSTATUS(shell.last_status), 0);

        execute(&mut shell, &fg(&["false"]));
        assert!(libc::WIFEXITED(shell.last_status));
        assert_eq!(libc::WEXITSTATUS(shell.last_status), 1);
    }

    #[test]
    fn exec_failure_surfaces_as_exit_one() {
        let _guard = STDIO_LOCK.lock().unwrap();
        let mut shell = Shell::new();
        execute(&mut shell, &fg(&["definitely-not-a-real-command-xyz"]));
        assert!(libc::WIFEXITED(shell.last_status));
        assert_eq!(libc::WEXITSTATUS(shell.last_status), 1);
    }

    #[test]
    fn output_redirect_round_trip() {
        let _guard = STDIO_LOCK.lock().unwrap();
        let path = temp_path("redir.txt");
        let mut shell = Shell::new();
        let mut cmd = fg(&["echo", "hi"]);
        cmd.stdout_path = Some(path.to_str().unwrap().to_string());

        let before = stat_fd(libc::STDOUT_FILENO);
        execute(&mut shell, &cmd);

        assert_eq!(fs::read_to_string(&path).unwrap(), "hi\n");
        assert_eq!(libc::WEXITSTATUS(shell.last_status), 0);
        // シェル側の stdout は復元済み
        assert_eq!(stat_fd(libc::STDOUT_FILENO), before);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn input_redirect_round_trip() {
        let _guard = STDIO_LOCK.lock().unwrap();
        let in_path = temp_path("rt-in.txt");
        let out_path = temp_path("rt-out.txt");
        fs::write(&in_path, "hi\n").unwrap();

        let mut shell = Shell::new();
        let mut cmd = fg(&["cat"]);
        cmd.stdin_path = Some(in_path.to_str().unwrap().to_string());
        cmd.stdout_path = Some(out_path.to_str().unwrap().to_string());

        let before_in = stat_fd(libc::STDIN_FILENO);
        execute(&mut shell, &cmd);

        // `echo hi > f` → `cat < f` 相当の往復で内容がそのまま流れる
        assert_eq!(fs::read_to_string(&out_path).unwrap(), "hi\n");
        assert_eq!(libc::WEXITSTATUS(shell.last_status), 0);
        assert_eq!(stat_fd(libc::STDIN_FILENO), before_in);

        let _ = fs::remove_file(&in_path);
        let _ = fs::remove_file(&out_path);
    }

    #[test]
    fn nul_in_argument_rejected_without_fork() {
        let _guard = STDIO_LOCK.lock().unwrap();
        let mut shell = Shell::new();
        execute(&mut shell, &fg(&["echo", "a\0b"]));

        // 黙って空引数に化けたりせず、exec 失敗と同じステータスで中止する
        assert_eq!(shell.last_status, exit_raw(1));
        assert_eq!(shell.jobs.iter().count(), 0);
    }

    #[test]
    fn input_open_failure_aborts_without_fork() {
        let _guard = STDIO_LOCK.lock().unwrap();
        let mut shell = Shell::new();
        let mut cmd = fg(&["cat"]);
        cmd.stdin_path = Some("/nonexistent-input-for-test".to_string());

        let before = stat_fd(libc::STDIN_FILENO);
        execute(&mut shell, &cmd);

        assert_eq!(shell.last_status, exit_raw(1));
        assert_eq!(stat_fd(libc::STDIN_FILENO), before);
        // fork されていないのでジョブも残らない
        assert_eq!(shell.jobs.iter().count(), 0);
    }

    // ── バックグラウンド ──

    #[test]
    fn foreground_only_mode_forces_foreground() {
        let _guard = STDIO_LOCK.lock().unwrap();
        signals::set_foreground_only(true);

        let mut shell = Shell::new();
        let mut cmd = fg(&["false"]);
        cmd.background = true;

        execute(&mut shell, &cmd);
        signals::set_foreground_only(false);

        // 専用モード中の `&` はフォアグラウンド実行される:
        // ジョブ登録はなく、終了までブロックしてステータスが書かれる
        assert_eq!(shell.jobs.iter().count(), 0);
        assert!(libc::WIFEXITED(shell.last_status));
        assert_eq!(libc::WEXITSTATUS(shell.last_status), 1);
    }

    #[test]
    fn background_job_registered_and_reaped() {
        let _guard = STDIO_LOCK.lock().unwrap();
        let mut shell = Shell::new();
        let mut cmd = fg(&["sleep", "0.1"]);
        cmd.background = true;

        execute(&mut shell, &cmd);
        assert_eq!(shell.jobs.iter().count(), 1);
        // last_status はバックグラウンド起動では書き換えない
        assert_eq!(shell.last_status, 0);

        let mut done = false;
        for _ in 0..500 {
            shell.jobs.reap();
            if shell.jobs.iter().all(|e| e.done) {
                done = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(done, "background job was never reaped");
    }
}
