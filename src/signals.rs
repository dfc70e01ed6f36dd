//! シグナル制御: SIGINT の無視とフォアグラウンド専用モードのトグル。
//!
//! - SIGINT: シェル本体は常に無視する。フォアグラウンドの子だけが
//!   fork 直後に `SIG_DFL` へ戻す（executor 側の仕事）。
//! - SIGTSTP: ハンドラがフォアグラウンド専用モードを反転し、固定文言と
//!   プロンプトマーカーを `write(2)` で直接出力する。ハンドラが触るのは
//!   この atomic フラグと 2 種類の固定出力だけで、共有構造体には触れない。
//!
//! ハンドラは `sigfillset` のマスク付きで登録し、実行中に他の捕捉可能
//! シグナルで中断されない。`SA_RESTART` により、ブロック中の行読み取りは
//! トグル後も同じ read から再開する。

use std::sync::atomic::{AtomicBool, Ordering};

/// フォアグラウンド専用モードのフラグ。
/// 書き込みは SIGTSTP ハンドラのみ、読み取りはディスパッチ時点。
static FOREGROUND_ONLY: AtomicBool = AtomicBool::new(false);

/// 現在フォアグラウンド専用モードかどうか。
///
/// コマンドのディスパッチ直前に読むこと。行の解析時点で読むと、
/// 解析とディスパッチの間に届いたトグルを取りこぼす。
pub fn foreground_only() -> bool {
    FOREGROUND_ONLY.load(Ordering::SeqCst)
}

/// フラグを直接設定する。テストがモードの合成規則を検証するための入口で、
/// 本体コードからは呼ばない（書き込みはハンドラのみ）。
#[doc(hidden)]
pub fn set_foreground_only(on: bool) {
    FOREGROUND_ONLY.store(on, Ordering::SeqCst);
}

/// フラグを反転し、反転後の値（true = 専用モード入り）を返す。
/// 書き込みはハンドラ 1 箇所のみなので load → store で競合しない。
fn flip(flag: &AtomicBool) -> bool {
    let entering = !flag.load(Ordering::SeqCst);
    flag.store(entering, Ordering::SeqCst);
    entering
}

/// SIGTSTP ハンドラ。async-signal-safe な操作（atomic と write）のみ使う。
extern "C" fn handle_sigtstp(_sig: libc::c_int) {
    let msg: &[u8] = if flip(&FOREGROUND_ONLY) {
        b"\nEntering foreground-only mode (& is now ignored)\n: "
    } else {
        b"\nExiting foreground-only mode\n: "
    };
    unsafe {
        libc::write(libc::STDOUT_FILENO, msg.as_ptr() as *const libc::c_void, msg.len());
    }
}

/// シェル本体のシグナル処理を設定する。起動時に 1 回だけ呼ぶ。
pub fn install() {
    unsafe {
        // SIGINT: シェルは無視。プロンプトループを Ctrl+C で抜けない。
        let mut sa_int: libc::sigaction = std::mem::zeroed();
        sa_int.sa_sigaction = libc::SIG_IGN;
        libc::sigfillset(&mut sa_int.sa_mask);
        libc::sigaction(libc::SIGINT, &sa_int, std::ptr::null_mut());

        // SIGTSTP: フォアグラウンド専用モードのトグル。
        // SA_RESTART で中断された read を自動再開させる。
        let mut sa_tstp: libc::sigaction = std::mem::zeroed();
        sa_tstp.sa_sigaction = handle_sigtstp as usize;
        libc::sigfillset(&mut sa_tstp.sa_mask);
        sa_tstp.sa_flags = libc::SA_RESTART;
        libc::sigaction(libc::SIGTSTP, &sa_tstp, std::ptr::null_mut());
    }
}

// ── テスト ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_toggles_and_returns_new_state() {
        // グローバルフラグを触ると並行テストに波及するため、ローカルで検証する
        let flag = AtomicBool::new(false);

        assert!(flip(&flag));
        assert!(flag.load(Ordering::SeqCst));

        assert!(!flip(&flag));
        assert!(!flag.load(Ordering::SeqCst));
    }
}
