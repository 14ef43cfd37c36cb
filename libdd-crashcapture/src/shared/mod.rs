// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub(crate) mod configuration;
pub mod constants;
pub(crate) mod dump_request;
