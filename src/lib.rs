//! minish ライブラリ — ベンチマーク・テスト用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs` の REPL ループ。
//! この `lib.rs` は `benches/bench_main.rs` 等の外部クレートから
//! パーサーや実行機能に直接アクセスするために存在する。
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

pub mod builtins;
pub mod executor;
pub mod job;
pub mod parser;
pub mod shell;
pub mod signals;
