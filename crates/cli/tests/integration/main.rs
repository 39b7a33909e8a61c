//! End-to-end tests driving the `keg` binary against local tarballs.

#![cfg(unix)]

mod common;
mod install_tests;
mod uninstall_tests;
